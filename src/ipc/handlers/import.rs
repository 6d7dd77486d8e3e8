use crate::csv_import::{self, ImportError, PlanField};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, log_activity, now_ts, required_str};
use crate::ipc::types::{AppState, Request};
use crate::plans::SqlitePlanSink;
use crate::templates::{self, TemplateChoice};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

const PREVIEW_ROWS: usize = 20;

/// CSV text from `params.text`, or read from `params.path`.
fn csv_text(req: &Request) -> Result<String, serde_json::Value> {
    if let Some(text) = req.params.get("text").and_then(|v| v.as_str()) {
        return Ok(text.to_string());
    }
    let path = required_str(req, "path").map_err(|_| {
        err(&req.id, "bad_params", "missing text or path", None)
    })?;
    std::fs::read_to_string(&path).map_err(|e| {
        err(
            &req.id,
            "parse_failed",
            format!("failed to read {}: {}", path, e),
            None,
        )
    })
}

fn missing_headers_err(req: &Request, e: &ImportError) -> serde_json::Value {
    let ImportError::MissingHeaders(labels) = e;
    err(
        &req.id,
        "missing_headers",
        e.to_string(),
        Some(json!({ "missing": labels })),
    )
}

fn handle_import_preview(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let text = match csv_text(req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let parsed = csv_import::parse(&text);
    let required = PlanField::REQUIRED.iter().map(|f| f.label()).collect::<Vec<_>>();
    if parsed.headers.is_empty() {
        return ok(
            &req.id,
            json!({
                "headers": [],
                "mapping": {},
                "unmapped": [],
                "required": required,
                "rowCount": 0,
                "rows": [],
            }),
        );
    }
    let mapping = match csv_import::map_headers(&parsed.headers) {
        Ok(m) => m,
        Err(e) => return missing_headers_err(req, &e),
    };
    let rows = parsed
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .enumerate()
        .map(|(i, row)| {
            let row_no = csv_import::sheet_row_number(i);
            match csv_import::build_plan(row, &mapping) {
                Ok(plan) => json!({ "row": row_no, "ok": true, "plan": plan }),
                Err(msg) => json!({ "row": row_no, "ok": false, "error": format!("{}행: {}", row_no, msg) }),
            }
        })
        .collect::<Vec<_>>();
    ok(
        &req.id,
        json!({
            "headers": parsed.headers,
            "mapping": mapping.to_key_map(),
            "unmapped": mapping.unmapped,
            "required": required,
            "rowCount": parsed.rows.len(),
            "rows": rows,
        }),
    )
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let text = match csv_text(req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let template = match req.params.get("template") {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => match TemplateChoice::from_json(raw) {
            Ok(c) => Some(c),
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
    };
    if let Some(tid) = template.as_ref().and_then(|c| c.template_id.as_deref()) {
        match templates::load_template(conn, tid) {
            Ok(Some(_)) => {}
            Ok(None) => return err(&req.id, "not_found", "template not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let mut sink = SqlitePlanSink::new(conn, now_ts());
    if let Some(choice) = template {
        sink = sink.with_template(choice);
    }
    let report = match csv_import::import_csv(&text, &mut sink) {
        Ok(r) => r,
        Err(e) => return missing_headers_err(req, &e),
    };
    info!(
        rows = report.rows,
        succeeded = report.succeeded,
        failed = report.failed,
        "csv import finished"
    );
    log_activity(
        state,
        conn,
        "import.csv",
        &format!("{} succeeded, {} failed", report.succeeded, report.failed),
    );
    ok(
        &req.id,
        json!({ "outcome": report.outcome(), "report": report }),
    )
}

fn handle_import_sample(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let csv = csv_import::sample_csv();
    let Some(out) = req.params.get("outPath").and_then(|v| v.as_str()) else {
        return ok(&req.id, json!({ "csv": csv }));
    };
    let out = PathBuf::from(out);
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(&req.id, "io_failed", e.to_string(), None);
        }
    }
    if let Err(e) = std::fs::write(&out, csv.as_bytes()) {
        return err(&req.id, "io_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "path": out.to_string_lossy(), "bytes": csv.len() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.previewCsv" => Some(handle_import_preview(state, req)),
        "import.csv" => Some(handle_import_csv(state, req)),
        "import.sampleCsv" => Some(handle_import_sample(state, req)),
        _ => None,
    }
}
