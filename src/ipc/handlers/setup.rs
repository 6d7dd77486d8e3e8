use crate::config::{self, ExportSettings};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, log_activity};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Clone, Copy)]
enum SetupSection {
    Export,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "export" => Some(Self::Export),
            _ => None,
        }
    }
}

/// Rejects unknown keys and out-of-range values. `null` resets a key.
fn validate_export_patch(patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        if v.is_null() {
            continue;
        }
        match k.as_str() {
            "campaignLabel" => {
                let s = v.as_str().ok_or("campaignLabel must be a string")?;
                if s.trim().is_empty() {
                    return Err("campaignLabel must not be empty".into());
                }
            }
            "yearSuffix" => {
                let s = v.as_str().ok_or("yearSuffix must be a string")?;
                if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                    return Err("yearSuffix must be digits".into());
                }
            }
            "pixelRatio" => {
                let n = v.as_f64().ok_or("pixelRatio must be a number")?;
                if !(1.0..=4.0).contains(&n) {
                    return Err("pixelRatio must be between 1 and 4".into());
                }
            }
            "jpegQuality" => {
                let n = v.as_u64().ok_or("jpegQuality must be an integer")?;
                if !(1..=100).contains(&n) {
                    return Err("jpegQuality must be between 1 and 100".into());
                }
            }
            "fontTimeoutMs" => {
                let n = v.as_u64().ok_or("fontTimeoutMs must be an integer")?;
                if n > 60_000 {
                    return Err("fontTimeoutMs must be at most 60000".into());
                }
            }
            "settleDelayMs" => {
                let n = v.as_u64().ok_or("settleDelayMs must be an integer")?;
                if n > 10_000 {
                    return Err("settleDelayMs must be at most 10000".into());
                }
            }
            other => return Err(format!("unknown export setting: {}", other)),
        }
    }
    Ok(())
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match ExportSettings::load(conn) {
        Ok(export) => ok(&req.id, json!({ "export": export })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let updated = match section {
        SetupSection::Export => {
            if let Err(msg) = validate_export_patch(patch_obj) {
                return err(&req.id, "bad_params", msg, None);
            }
            match config::update_export_section(conn, patch_obj) {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
            }
        }
    };
    let keys = patch_obj.keys().cloned().collect::<Vec<_>>().join(",");
    log_activity(state, conn, "setup.update", &format!("{}: {}", section_raw, keys));
    info!(section = section_raw, "settings updated");
    state.export = updated.clone();
    ok(&req.id, json!({ "export": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_patch_validation() {
        let good = json!({ "campaignLabel": "봄 특강", "pixelRatio": 3, "settleDelayMs": null });
        assert!(validate_export_patch(good.as_object().expect("object")).is_ok());

        let bad = json!({ "jpegQuality": 150 });
        assert!(validate_export_patch(bad.as_object().expect("object")).is_err());

        let unknown = json!({ "dpi": 300 });
        let msg = validate_export_patch(unknown.as_object().expect("object")).expect_err("unknown");
        assert!(msg.contains("dpi"));
    }
}
