mod test_support;

use serde_json::json;
use test_support::{create_plan, spawn_sidecar};

fn plan_ids(list: &serde_json::Value) -> Vec<String> {
    list.get("plans")
        .and_then(|v| v.as_array())
        .expect("plans")
        .iter()
        .filter_map(|p| p.get("id").and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

#[test]
fn create_open_update_roundtrip() {
    let mut sidecar = spawn_sidecar();
    sidecar.open_workspace("lectured-plans-crud");

    let id = create_plan(&mut sidecar, "중2 수학 내신", "김민지");
    let opened = sidecar.request_ok("plans.open", json!({ "planId": id }));
    let plan = opened.get("plan").expect("plan");
    assert_eq!(plan.get("title").and_then(|v| v.as_str()), Some("중2 수학 내신"));
    let weekly = plan.get("weekly").and_then(|v| v.as_array()).expect("weekly");
    assert_eq!(weekly.len(), 8);
    assert_eq!(weekly[1].get("weekLabel").and_then(|v| v.as_str()), Some("2주차"));
    assert_eq!(weekly[1].get("topic").and_then(|v| v.as_str()), Some("함수"));
    let fees = plan.get("fees").and_then(|v| v.as_array()).expect("fees");
    assert_eq!(fees[0].get("amount").and_then(|v| v.as_i64()), Some(320000));

    let updated = sidecar.request_ok(
        "plans.update",
        json!({
            "planId": id,
            "patch": { "classTime": "18:00-20:00", "fees": [] }
        }),
    );
    let plan = updated.get("plan").expect("plan");
    assert_eq!(plan.get("classTime").and_then(|v| v.as_str()), Some("18:00-20:00"));
    assert_eq!(plan.get("fees").and_then(|v| v.as_array()).map(|a| a.len()), Some(0));
    assert_eq!(plan.get("title").and_then(|v| v.as_str()), Some("중2 수학 내신"));

    let (code, _) = sidecar.request_err(
        "plans.update",
        json!({ "planId": id, "patch": { "colour": "red" } }),
    );
    assert_eq!(code, "bad_params");
    let (code, _) = sidecar.request_err(
        "plans.update",
        json!({ "planId": "missing", "patch": { "title": "x" } }),
    );
    assert_eq!(code, "not_found");
    let (code, _) = sidecar.request_err(
        "plans.create",
        json!({ "plan": { "title": "  ", "instructor": "김민지" } }),
    );
    assert_eq!(code, "bad_params");
    let (code, _) = sidecar.request_err(
        "plans.create",
        json!({ "plan": { "title": "수학", "instructor": "김민지", "colour": "red" } }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn list_filters_by_instructor() {
    let mut sidecar = spawn_sidecar();
    sidecar.open_workspace("lectured-plans-filter");

    let a = create_plan(&mut sidecar, "수학 A", "김민지");
    let b = create_plan(&mut sidecar, "국어 B", "이서준");

    let all = sidecar.request_ok("plans.list", json!({}));
    assert_eq!(plan_ids(&all).len(), 2);
    let only = sidecar.request_ok("plans.list", json!({ "instructor": "이서준" }));
    assert_eq!(plan_ids(&only), vec![b]);
    assert!(!plan_ids(&only).contains(&a));
}

#[test]
fn trash_restore_purge_and_empty() {
    let mut sidecar = spawn_sidecar();
    sidecar.open_workspace("lectured-plans-trash");

    let a = create_plan(&mut sidecar, "수학 A", "김민지");
    let b = create_plan(&mut sidecar, "수학 B", "김민지");
    let c = create_plan(&mut sidecar, "수학 C", "김민지");

    for id in [&a, &b, &c] {
        sidecar.request_ok("plans.trash", json!({ "planId": id }));
    }
    let (code, _) = sidecar.request_err("plans.trash", json!({ "planId": a }));
    assert_eq!(code, "not_found");

    let active = sidecar.request_ok("plans.list", json!({}));
    assert!(plan_ids(&active).is_empty());
    let trash = sidecar.request_ok("trash.list", json!({}));
    assert_eq!(plan_ids(&trash).len(), 3);

    sidecar.request_ok("plans.restore", json!({ "planId": a }));
    sidecar.request_ok("plans.purge", json!({ "planId": b }));
    let (code, _) = sidecar.request_err("plans.purge", json!({ "planId": a }));
    assert_eq!(code, "not_found");

    let emptied = sidecar.request_ok("trash.empty", json!({}));
    assert_eq!(emptied.get("purged").and_then(|v| v.as_u64()), Some(1));

    let active = sidecar.request_ok("plans.list", json!({}));
    assert_eq!(plan_ids(&active), vec![a]);
    let trash = sidecar.request_ok("trash.list", json!({}));
    assert!(plan_ids(&trash).is_empty());
    let (code, _) = sidecar.request_err("plans.open", json!({ "planId": c }));
    assert_eq!(code, "not_found");
}

#[test]
fn apply_template_updates_active_plans_only() {
    let mut sidecar = spawn_sidecar();
    sidecar.open_workspace("lectured-plans-template");

    let a = create_plan(&mut sidecar, "수학 A", "김민지");
    let b = create_plan(&mut sidecar, "수학 B", "김민지");
    sidecar.request_ok("plans.trash", json!({ "planId": b }));

    let applied = sidecar.request_ok(
        "plans.applyTemplate",
        json!({
            "planIds": [a, b],
            "template": { "category": "premium", "colorTheme": "purple" }
        }),
    );
    assert_eq!(applied.get("updated").and_then(|v| v.as_u64()), Some(1));

    let opened = sidecar.request_ok("plans.open", json!({ "planId": a }));
    let plan = opened.get("plan").expect("plan");
    assert_eq!(plan.get("templateCategory").and_then(|v| v.as_str()), Some("premium"));
    assert_eq!(plan.get("colorTheme").and_then(|v| v.as_str()), Some("purple"));

    let (code, _) = sidecar.request_err(
        "plans.applyTemplate",
        json!({ "planIds": [a], "template": { "colorTheme": "teal" } }),
    );
    assert_eq!(code, "bad_params");
    let (code, _) = sidecar.request_err(
        "plans.applyTemplate",
        json!({ "planIds": [a], "template": { "templateId": "missing" } }),
    );
    assert_eq!(code, "not_found");
}
