mod test_support;

use serde_json::json;
use test_support::{create_plan, spawn_sidecar};

fn latest_actor(sidecar: &mut test_support::Sidecar) -> String {
    let activity = sidecar.request_ok("activity.list", json!({ "limit": 1 }));
    activity
        .get("entries")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|e| e.get("actor"))
        .and_then(|v| v.as_str())
        .expect("actor")
        .to_string()
}

#[test]
fn activity_actor_follows_session() {
    let mut sidecar = spawn_sidecar();
    sidecar.open_workspace("lectured-session");

    create_plan(&mut sidecar, "수학 A", "김민지");
    assert_eq!(latest_actor(&mut sidecar), "system");

    sidecar.request_ok(
        "profiles.upsert",
        json!({ "loginId": "minji", "displayName": "김민지", "role": "staff" }),
    );
    let (code, _) = sidecar.request_err("session.login", json!({ "loginId": "nobody" }));
    assert_eq!(code, "not_found");

    let login = sidecar.request_ok("session.login", json!({ "loginId": "minji" }));
    assert_eq!(
        login.get("session").and_then(|s| s.get("displayName")).and_then(|v| v.as_str()),
        Some("김민지")
    );
    create_plan(&mut sidecar, "수학 B", "김민지");
    assert_eq!(latest_actor(&mut sidecar), "minji");

    sidecar.request_ok("session.logout", json!({}));
    let current = sidecar.request_ok("session.current", json!({}));
    assert!(current.get("session").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn inactive_profile_cannot_log_in() {
    let mut sidecar = spawn_sidecar();
    sidecar.open_workspace("lectured-session-inactive");

    sidecar.request_ok(
        "profiles.upsert",
        json!({ "loginId": "seojun", "role": "admin", "active": false }),
    );
    let (code, _) = sidecar.request_err("session.login", json!({ "loginId": "seojun" }));
    assert_eq!(code, "inactive_profile");

    let (code, _) = sidecar.request_err("profiles.upsert", json!({ "loginId": "x", "role": "owner" }));
    assert_eq!(code, "bad_params");

    let profiles = sidecar.request_ok("profiles.list", json!({}));
    let list = profiles.get("profiles").and_then(|v| v.as_array()).expect("profiles");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].get("active").and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn setup_update_validates_and_persists() {
    let mut sidecar = spawn_sidecar();
    let workspace = sidecar.open_workspace("lectured-setup");

    let (code, _) = sidecar.request_err(
        "setup.update",
        json!({ "section": "export", "patch": { "jpegQuality": 0 } }),
    );
    assert_eq!(code, "bad_params");

    sidecar.request_ok(
        "setup.update",
        json!({ "section": "export", "patch": { "campaignLabel": "봄 특강", "jpegQuality": 80 } }),
    );
    sidecar.request_ok("workspace.close", json!({}));
    sidecar.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let setup = sidecar.request_ok("setup.get", json!({}));
    let export = setup.get("export").expect("export");
    assert_eq!(export.get("campaignLabel").and_then(|v| v.as_str()), Some("봄 특강"));
    assert_eq!(export.get("jpegQuality").and_then(|v| v.as_u64()), Some(80));
    assert_eq!(export.get("pixelRatio").and_then(|v| v.as_f64()), Some(2.0));
}
