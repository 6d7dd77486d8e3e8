use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, log_activity, now_ts, required_str};
use crate::ipc::types::{AppState, Request};
use crate::templates::{self, default_blocks, ColorTheme, PageSize, TemplateBlock, TemplateCategory, TemplateChoice};
use serde_json::json;

fn handle_templates_catalog(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let categories = TemplateCategory::ALL
        .iter()
        .map(|c| {
            json!({
                "id": c.as_str(),
                "label": c.label_ko(),
                "blocks": default_blocks(*c),
            })
        })
        .collect::<Vec<_>>();
    let themes = ColorTheme::ALL
        .iter()
        .map(|t| {
            let p = t.palette();
            json!({
                "id": t.as_str(),
                "label": t.label_ko(),
                "palette": {
                    "background": p.background,
                    "primary": p.primary,
                    "accent": p.accent,
                    "surface": p.surface,
                    "ink": p.ink,
                },
            })
        })
        .collect::<Vec<_>>();
    let page_sizes = [PageSize::A4, PageSize::A4Long]
        .iter()
        .map(|p| json!({ "id": p.as_str(), "width": templates::PAGE_WIDTH, "height": p.height() }))
        .collect::<Vec<_>>();
    ok(
        &req.id,
        json!({ "categories": categories, "themes": themes, "pageSizes": page_sizes }),
    )
}

fn handle_templates_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match templates::list_templates(conn) {
        Ok(rows) => ok(&req.id, json!({ "templates": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_templates_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut choice = match TemplateChoice::from_json(&req.params) {
        Ok(c) => c,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    choice.template_id = None;
    let page_size = match req.params.get("pageSize").and_then(|v| v.as_str()) {
        None => choice.category.default_page_size(),
        Some(s) => match PageSize::parse(s) {
            Some(p) => p,
            None => return err(&req.id, "bad_params", format!("unknown pageSize: {}", s), None),
        },
    };
    match templates::create_template(conn, &name, &choice, page_size, &now_ts()) {
        Ok(t) => {
            log_activity(state, conn, "templates.create", &t.name);
            ok(&req.id, json!({ "template": t }))
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_templates_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let template_id = match required_str(req, "templateId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let template = match templates::load_template(conn, &template_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "template not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match templates::load_blocks(conn, &template_id) {
        Ok(blocks) => ok(&req.id, json!({ "template": template, "blocks": blocks })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_templates_save_blocks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let template_id = match required_str(req, "templateId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("blocks").filter(|v| v.is_array()) else {
        return err(&req.id, "bad_params", "blocks must be an array", None);
    };
    let blocks: Vec<TemplateBlock> = match serde_json::from_value(raw.clone()) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "bad_params", format!("invalid blocks: {}", e), None),
    };
    let mut keys = std::collections::HashSet::new();
    for b in &blocks {
        if b.key.trim().is_empty() || !keys.insert(b.key.as_str()) {
            return err(
                &req.id,
                "bad_params",
                format!("block keys must be unique and non-empty: {:?}", b.key),
                None,
            );
        }
    }
    let template = match templates::load_template(conn, &template_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "template not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match templates::save_blocks(conn, &template, &blocks, &now_ts()) {
        Ok(saved) => {
            log_activity(state, conn, "templates.saveBlocks", &template.name);
            ok(&req.id, json!({ "blocks": saved }))
        }
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_templates_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let template_id = match required_str(req, "templateId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match templates::delete_template(conn, &template_id) {
        Ok(true) => {
            log_activity(state, conn, "templates.delete", &template_id);
            ok(&req.id, json!({ "deleted": true }))
        }
        Ok(false) => err(&req.id, "not_found", "template not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "templates.catalog" => Some(handle_templates_catalog(state, req)),
        "templates.list" => Some(handle_templates_list(state, req)),
        "templates.create" => Some(handle_templates_create(state, req)),
        "templates.open" => Some(handle_templates_open(state, req)),
        "templates.saveBlocks" => Some(handle_templates_save_blocks(state, req)),
        "templates.delete" => Some(handle_templates_delete(state, req)),
        _ => None,
    }
}
