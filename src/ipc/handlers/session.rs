use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, log_activity, now_ts, required_str};
use crate::ipc::types::{AppState, Request, Session};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const ROLES: [&str; 2] = ["admin", "staff"];

struct ProfileRow {
    id: String,
    login_id: String,
    display_name: String,
    role: String,
    active: bool,
}

impl ProfileRow {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "loginId": self.login_id,
            "displayName": self.display_name,
            "role": self.role,
            "active": self.active,
        })
    }
}

fn profile_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: r.get(0)?,
        login_id: r.get(1)?,
        display_name: r.get(2)?,
        role: r.get(3)?,
        active: r.get::<_, i64>(4)? != 0,
    })
}

fn find_profile(conn: &Connection, login_id: &str) -> rusqlite::Result<Option<ProfileRow>> {
    conn.query_row(
        "SELECT id, login_id, display_name, role, active FROM profiles WHERE login_id = ?",
        [login_id],
        profile_from_row,
    )
    .optional()
}

fn handle_profiles_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, login_id, display_name, role, active FROM profiles ORDER BY login_id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt
        .query_map([], profile_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let profiles = rows.iter().map(ProfileRow::to_json).collect::<Vec<_>>();
    ok(&req.id, json!({ "profiles": profiles }))
}

fn handle_profiles_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let login_id = match required_str(req, "loginId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let display_name = req
        .params
        .get("displayName")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| login_id.clone());
    let role = req
        .params
        .get("role")
        .and_then(|v| v.as_str())
        .unwrap_or("staff")
        .to_ascii_lowercase();
    if !ROLES.contains(&role.as_str()) {
        return err(&req.id, "bad_params", "role must be admin or staff", None);
    }
    let active = match req.params.get("active") {
        None => true,
        Some(v) => match v.as_bool() {
            Some(b) => b,
            None => return err(&req.id, "bad_params", "active must be a boolean", None),
        },
    };

    let existing = match find_profile(conn, &login_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let id = existing
        .as_ref()
        .map(|p| p.id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Err(e) = conn.execute(
        "INSERT INTO profiles(id, login_id, display_name, role, active, created_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(login_id) DO UPDATE SET
            display_name = excluded.display_name,
            role = excluded.role,
            active = excluded.active",
        (&id, &login_id, &display_name, &role, active as i64, now_ts()),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    log_activity(state, conn, "profiles.upsert", &login_id);

    let profile = ProfileRow {
        id,
        login_id,
        display_name,
        role,
        active,
    };
    ok(
        &req.id,
        json!({ "profile": profile.to_json(), "created": existing.is_none() }),
    )
}

fn handle_session_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let login_id = match required_str(req, "loginId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let profile = match find_profile(conn, &login_id) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "not_found", "profile not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !profile.active {
        return err(&req.id, "inactive_profile", "profile is inactive", None);
    }
    let session = Session {
        profile_id: profile.id,
        login_id: profile.login_id,
        display_name: profile.display_name,
        role: profile.role,
    };
    info!(login_id = %session.login_id, "session started");
    state.session = Some(session.clone());
    if let Some(conn) = state.db.as_ref() {
        log_activity(state, conn, "session.login", &session.login_id);
    }
    ok(&req.id, json!({ "session": session }))
}

fn handle_session_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let (Some(conn), Some(session)) = (state.db.as_ref(), state.session.as_ref()) {
        log_activity(state, conn, "session.logout", &session.login_id);
    }
    let was_logged_in = state.session.take().is_some();
    ok(&req.id, json!({ "loggedOut": was_logged_in }))
}

fn handle_session_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "session": state.session }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profiles.list" => Some(handle_profiles_list(state, req)),
        "profiles.upsert" => Some(handle_profiles_upsert(state, req)),
        "session.login" => Some(handle_session_login(state, req)),
        "session.logout" => Some(handle_session_logout(state, req)),
        "session.current" => Some(handle_session_current(state, req)),
        _ => None,
    }
}
