use crate::activity;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::Value;
use tracing::warn;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn string_array(req: &Request, key: &str) -> Result<Vec<String>, Value> {
    let Some(arr) = req.params.get(key).and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    err(
                        &req.id,
                        "bad_params",
                        format!("{} must contain non-empty strings", key),
                        None,
                    )
                })
        })
        .collect()
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Login id of the current session, else "system".
pub fn actor(state: &AppState) -> String {
    state
        .session
        .as_ref()
        .map(|s| s.login_id.clone())
        .unwrap_or_else(|| activity::SYSTEM_ACTOR.to_string())
}

/// Activity logging never fails the request that triggered it.
pub fn log_activity(state: &AppState, conn: &Connection, action: &str, detail: &str) {
    if let Err(e) = activity::record(conn, &actor(state), action, detail, &now_ts()) {
        warn!(action, error = %e, "failed to record activity");
    }
}
