mod test_support;

use serde_json::json;
use test_support::{create_plan, spawn_sidecar};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut sidecar = spawn_sidecar();

    let health = sidecar.request_ok("health", json!({}));
    assert_eq!(health.get("ready").and_then(|v| v.as_bool()), Some(false));

    let (code, _) = sidecar.request_err("plans.list", json!({}));
    assert_eq!(code, "no_workspace");

    let workspace = sidecar.open_workspace("lectured-router-smoke");
    let health = sidecar.request_ok("health", json!({}));
    assert_eq!(health.get("ready").and_then(|v| v.as_bool()), Some(true));

    let plan_id = create_plan(&mut sidecar, "중2 수학", "김민지");
    let calls = [
        ("setup.get", json!({})),
        ("profiles.list", json!({})),
        ("session.current", json!({})),
        ("plans.list", json!({})),
        ("plans.open", json!({ "planId": plan_id })),
        ("trash.list", json!({})),
        ("templates.catalog", json!({})),
        ("templates.list", json!({})),
        ("import.sampleCsv", json!({})),
        ("activity.list", json!({ "limit": 10 })),
        (
            "export.bulk",
            json!({
                "outPath": workspace.join("smoke.zip").to_string_lossy(),
                "selections": []
            }),
        ),
    ];
    for (method, params) in calls {
        sidecar.request_ok(method, params);
    }

    let (code, _) = sidecar.request_err("nope.method", json!({}));
    assert_eq!(code, "not_implemented");

    let closed = sidecar.request_ok("workspace.close", json!({}));
    assert_eq!(closed.get("closed").and_then(|v| v.as_bool()), Some(true));
    let (code, _) = sidecar.request_err("plans.list", json!({}));
    assert_eq!(code, "no_workspace");
}

#[test]
fn workspace_select_requires_path() {
    let mut sidecar = spawn_sidecar();
    let (code, _) = sidecar.request_err("workspace.select", json!({}));
    assert_eq!(code, "bad_params");
}
