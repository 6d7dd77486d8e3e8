use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, log_activity, now_ts, optional_str, required_str, string_array};
use crate::ipc::types::{AppState, Request};
use crate::plans::{self, normalize_weekly, LecturePlan, PlanFilter, PlanPatch};
use crate::templates::{self, PageSize, TemplateChoice};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn handle_plans_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    list_with_filter(state, req, false)
}

fn handle_trash_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    list_with_filter(state, req, true)
}

fn list_with_filter(state: &AppState, req: &Request, trashed: bool) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let filter = PlanFilter {
        instructor: optional_str(req, "instructor"),
        trashed,
    };
    match plans::list_plans(conn, &filter) {
        Ok(rows) => ok(&req.id, json!({ "plans": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_plans_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match plans::load_plan(conn, &plan_id) {
        Ok(Some(rec)) => ok(&req.id, json!({ "plan": rec })),
        Ok(None) => err(&req.id, "not_found", "plan not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_plans_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("plan") else {
        return err(&req.id, "bad_params", "missing plan", None);
    };
    let mut plan: LecturePlan = match serde_json::from_value(raw.clone()) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", format!("invalid plan: {}", e), None),
    };
    plan.title = plan.title.trim().to_string();
    plan.instructor = plan.instructor.trim().to_string();
    if plan.title.is_empty() || plan.instructor.is_empty() {
        return err(&req.id, "bad_params", "title and instructor are required", None);
    }
    if PageSize::parse(&plan.page_size).is_none() {
        plan.page_size = PageSize::default().as_str().to_string();
    }
    plan.id = Uuid::new_v4().to_string();
    plan.weekly = normalize_weekly(std::mem::take(&mut plan.weekly));

    let now = now_ts();
    if let Err(e) = plans::insert_plan(conn, &plan, &now) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    log_activity(state, conn, "plans.create", &plan.title);
    info!(plan_id = %plan.id, "plan created");
    ok(&req.id, json!({ "planId": plan.id }))
}

fn handle_plans_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("patch").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let patch: PlanPatch = match serde_json::from_value(raw.clone()) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", format!("invalid patch: {}", e), None),
    };
    if let Some(ps) = patch.page_size.as_deref() {
        if PageSize::parse(ps).is_none() {
            return err(&req.id, "bad_params", format!("unknown pageSize: {}", ps), None);
        }
    }
    for (name, v) in [("title", &patch.title), ("instructor", &patch.instructor)] {
        if v.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return err(&req.id, "bad_params", format!("{} must not be empty", name), None);
        }
    }
    match plans::update_plan(conn, &plan_id, patch, &now_ts()) {
        Ok(Some(rec)) => {
            log_activity(state, conn, "plans.update", &rec.plan.title);
            ok(&req.id, json!({ "plan": rec }))
        }
        Ok(None) => err(&req.id, "not_found", "plan not found", None),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_plans_apply_template(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_ids = match string_array(req, "planIds") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("template") else {
        return err(&req.id, "bad_params", "missing template", None);
    };
    let choice = match TemplateChoice::from_json(raw) {
        Ok(c) => c,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    if let Some(tid) = choice.template_id.as_deref() {
        match templates::load_template(conn, tid) {
            Ok(Some(_)) => {}
            Ok(None) => return err(&req.id, "not_found", "template not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    match plans::apply_template(conn, &plan_ids, &choice, &now_ts()) {
        Ok(updated) => {
            log_activity(
                state,
                conn,
                "plans.applyTemplate",
                &format!("{} ({} plans)", choice.display_name(), updated),
            );
            ok(&req.id, json!({ "updated": updated }))
        }
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_plans_trash(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match plans::trash_plan(conn, &plan_id, &now_ts()) {
        Ok(true) => {
            log_activity(state, conn, "plans.trash", &plan_id);
            ok(&req.id, json!({ "trashed": true }))
        }
        Ok(false) => err(&req.id, "not_found", "active plan not found", None),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_plans_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match plans::restore_plan(conn, &plan_id, &now_ts()) {
        Ok(true) => {
            log_activity(state, conn, "plans.restore", &plan_id);
            ok(&req.id, json!({ "restored": true }))
        }
        Ok(false) => err(&req.id, "not_found", "trashed plan not found", None),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_plans_purge(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match plans::purge_plan(conn, &plan_id) {
        Ok(true) => {
            log_activity(state, conn, "plans.purge", &plan_id);
            ok(&req.id, json!({ "purged": true }))
        }
        Ok(false) => err(&req.id, "not_found", "trashed plan not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_trash_empty(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match plans::empty_trash(conn) {
        Ok(n) => {
            log_activity(state, conn, "trash.empty", &format!("{} plans", n));
            ok(&req.id, json!({ "purged": n }))
        }
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "plans.list" => Some(handle_plans_list(state, req)),
        "plans.open" => Some(handle_plans_open(state, req)),
        "plans.create" => Some(handle_plans_create(state, req)),
        "plans.update" => Some(handle_plans_update(state, req)),
        "plans.applyTemplate" => Some(handle_plans_apply_template(state, req)),
        "plans.trash" => Some(handle_plans_trash(state, req)),
        "plans.restore" => Some(handle_plans_restore(state, req)),
        "plans.purge" => Some(handle_plans_purge(state, req)),
        "trash.list" => Some(handle_trash_list(state, req)),
        "trash.empty" => Some(handle_trash_empty(state, req)),
        _ => None,
    }
}
