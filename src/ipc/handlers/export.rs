use crate::export::{self, ExportJob, ExportPhase, InstructorSelection};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, log_activity, required_str};
use crate::ipc::types::{AppState, Request};
use crate::plans;
use crate::render::BlockRenderer;
use crate::templates::{self, TemplateChoice};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

/// Resolves one `{instructor, template?, planIds?}` entry. Without `planIds`
/// every active plan of the instructor is taken. Without `template` each
/// plan renders into the template saved on it.
fn resolve_selection(conn: &Connection, raw: &Value) -> Result<InstructorSelection, (String, String)> {
    let bad = |msg: String| ("bad_params".to_string(), msg);
    let instructor = raw
        .get("instructor")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad("selection missing instructor".to_string()))?;
    let template = match raw.get("template") {
        None | Some(Value::Null) => None,
        Some(t) => Some(TemplateChoice::from_json(t).map_err(bad)?),
    };

    let plans = match raw.get("planIds").and_then(|v| v.as_array()) {
        None => plans::plans_for_instructor(conn, &instructor)
            .map_err(|e| ("db_query_failed".to_string(), e.to_string()))?,
        Some(ids) => {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                let id = id
                    .as_str()
                    .ok_or_else(|| bad("planIds must contain strings".to_string()))?;
                let rec = plans::load_plan(conn, id)
                    .map_err(|e| ("db_query_failed".to_string(), e.to_string()))?
                    .filter(|r| r.deleted_at.is_none())
                    .ok_or_else(|| ("not_found".to_string(), format!("plan not found: {}", id)))?;
                out.push(rec.plan);
            }
            out
        }
    };
    let mut jobs = Vec::with_capacity(plans.len());
    for plan in plans {
        let template = template.clone().unwrap_or_else(|| plan.template_choice());
        let blocks = templates::resolve_blocks(conn, &template)
            .map_err(|e| ("db_query_failed".to_string(), e.to_string()))?;
        jobs.push(ExportJob {
            plan,
            template,
            blocks,
        });
    }
    Ok(InstructorSelection { instructor, jobs })
}

fn handle_export_bulk(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let Some(raw_selections) = req.params.get("selections").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "selections must be an array", None);
    };
    let mut selections = Vec::with_capacity(raw_selections.len());
    for raw in raw_selections {
        match resolve_selection(conn, raw) {
            Ok(s) => selections.push(s),
            Err((code, msg)) => return err(&req.id, &code, msg, None),
        }
    }

    if let Some(parent) = out_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(&req.id, "export_failed", e.to_string(), None);
        }
    }
    let file = match File::create(&out_path) {
        Ok(f) => f,
        Err(e) => return err(&req.id, "export_failed", e.to_string(), None),
    };

    let mut trail: Vec<ExportPhase> = Vec::new();
    let mut renderer = BlockRenderer::new();
    let result = export::export_bulk(
        &mut renderer,
        &state.export,
        &selections,
        BufWriter::new(file),
        |phase| {
            match phase {
                ExportPhase::Running {
                    current,
                    total,
                    label,
                } => info!(current, total, label = %label, "export progress"),
                other => info!(phase = ?other, "export phase"),
            }
            trail.push(phase.clone());
        },
    );

    match result {
        Ok(summary) => {
            log_activity(
                state,
                conn,
                "export.bulk",
                &format!(
                    "{} written, {} skipped",
                    summary.files.len(),
                    summary.skipped.len()
                ),
            );
            ok(
                &req.id,
                json!({
                    "path": out_path.to_string_lossy(),
                    "total": summary.total,
                    "files": summary.files,
                    "skipped": summary.skipped,
                    "phase": trail.last().cloned().unwrap_or(ExportPhase::Idle),
                    "progress": trail,
                }),
            )
        }
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&out_path) {
                warn!(path = %out_path.display(), error = %rm, "failed to remove partial archive");
            }
            err(
                &req.id,
                "export_failed",
                format!("{e:#}"),
                Some(json!({ "progress": trail })),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.bulk" => Some(handle_export_bulk(state, req)),
        _ => None,
    }
}
