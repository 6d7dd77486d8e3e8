mod test_support;

use serde_json::json;
use std::io::Read;
use test_support::{create_plan, spawn_sidecar};

fn archive_entries(path: &std::path::Path) -> Vec<(String, Vec<u8>)> {
    let file = std::fs::File::open(path).expect("open archive");
    let mut archive = zip::ZipArchive::new(file).expect("read archive");
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).expect("entry");
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).expect("read entry");
            (entry.name().to_string(), bytes)
        })
        .collect()
}

#[test]
fn three_instructors_two_plans_each_yield_six_images() {
    let mut sidecar = spawn_sidecar();
    let workspace = sidecar.open_workspace("lectured-export-bulk");
    sidecar.request_ok(
        "setup.update",
        json!({
            "section": "export",
            "patch": {
                "campaignLabel": "겨울 특강",
                "yearSuffix": "26",
                "pixelRatio": 1,
                "settleDelayMs": 0
            }
        }),
    );

    let instructors = ["김민지", "이서준", "박하늘"];
    for name in instructors {
        create_plan(&mut sidecar, &format!("{} 수학", name), name);
        create_plan(&mut sidecar, &format!("{} 과학", name), name);
    }
    let selections = instructors
        .iter()
        .map(|name| json!({ "instructor": name, "template": { "category": "basic", "colorTheme": "navy" } }))
        .collect::<Vec<_>>();

    let out = workspace.join("out").join("plans.zip");
    let result = sidecar.request_ok(
        "export.bulk",
        json!({ "outPath": out.to_string_lossy(), "selections": selections }),
    );
    assert_eq!(result.get("total").and_then(|v| v.as_u64()), Some(6));
    assert_eq!(
        result.get("skipped").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
    let phase = result.get("phase").expect("phase");
    assert_eq!(phase.get("phase").and_then(|v| v.as_str()), Some("done"));
    assert_eq!(phase.get("written").and_then(|v| v.as_u64()), Some(6));

    let entries = archive_entries(&out);
    assert_eq!(entries.len(), 6);
    for (name, bytes) in &entries {
        assert!(name.ends_with(".jpg"), "{}", name);
        assert!(name.starts_with("26_겨울_특강_"), "{}", name);
        assert!(!name.chars().any(char::is_whitespace), "{}", name);
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
    assert_eq!(entries[0].0, "26_겨울_특강_김민지_과학_김민지_기본형_네이비.jpg");

    let img = image::load_from_memory(&entries[0].1).expect("decode jpeg");
    let ratio = img.height() as f64 / img.width() as f64;
    assert!((ratio - 297.0 / 210.0).abs() < 0.01, "ratio {}", ratio);
    assert!(img.width() >= 794);
}

#[test]
fn explicit_plan_ids_and_unknown_plan() {
    let mut sidecar = spawn_sidecar();
    let workspace = sidecar.open_workspace("lectured-export-ids");
    let a = create_plan(&mut sidecar, "수학 A", "김민지");
    let _b = create_plan(&mut sidecar, "수학 B", "김민지");

    let out = workspace.join("one.zip");
    let result = sidecar.request_ok(
        "export.bulk",
        json!({
            "outPath": out.to_string_lossy(),
            "selections": [{ "instructor": "김민지", "planIds": [a], "template": { "category": "premium", "colorTheme": "mono" } }]
        }),
    );
    let files = result.get("files").and_then(|v| v.as_array()).expect("files");
    assert_eq!(files.len(), 1);
    assert!(files[0].as_str().expect("name").contains("프리미엄형_모노"));

    let (code, _) = sidecar.request_err(
        "export.bulk",
        json!({
            "outPath": workspace.join("bad.zip").to_string_lossy(),
            "selections": [{ "instructor": "김민지", "planIds": ["missing"] }]
        }),
    );
    assert_eq!(code, "not_found");
    let (code, _) = sidecar.request_err("export.bulk", json!({ "selections": [] }));
    assert_eq!(code, "bad_params");
}

#[test]
fn selection_without_template_uses_each_plans_saved_template() {
    let mut sidecar = spawn_sidecar();
    let workspace = sidecar.open_workspace("lectured-export-saved-template");
    let premium = create_plan(&mut sidecar, "수학", "김민지");
    let _basic = create_plan(&mut sidecar, "과학", "김민지");
    sidecar.request_ok(
        "plans.applyTemplate",
        json!({
            "planIds": [premium],
            "template": { "category": "premium", "colorTheme": "purple" }
        }),
    );

    let out = workspace.join("saved.zip");
    let result = sidecar.request_ok(
        "export.bulk",
        json!({
            "outPath": out.to_string_lossy(),
            "selections": [{ "instructor": "김민지" }]
        }),
    );
    let files = result
        .get("files")
        .and_then(|v| v.as_array())
        .expect("files")
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect::<Vec<_>>();
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.ends_with("_수학_김민지_프리미엄형_퍼플.jpg")), "{:?}", files);
    assert!(files.iter().any(|f| f.ends_with("_과학_김민지_기본형_네이비.jpg")), "{:?}", files);
}
