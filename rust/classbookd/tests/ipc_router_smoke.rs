mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("classbook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    assert_eq!(
        request_err(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "x" })),
        "no_workspace"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.create",
        json!({ "name": "Smoke Class" }),
    );
    let class_id = created
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    let calls = [
        ("5", "classes.list", json!({})),
        ("6", "students.list", json!({ "classId": class_id })),
        ("7", "holidays.list", json!({})),
        ("8", "calendar.classify", json!({ "date": "2025-01-05" })),
        ("9", "calendar.range", json!({ "start": "2025-01-01", "end": "2025-01-07" })),
        ("10", "schedule.list", json!({ "classId": class_id })),
        ("11", "schedule.expand", json!({ "classId": class_id, "date": "2025-01-06" })),
        ("12", "attendance.dayOpen", json!({ "classId": class_id, "date": "2025-01-06" })),
        ("13", "attendance.recap", json!({ "classId": class_id, "start": "2025-01-01", "end": "2025-01-31" })),
        ("14", "journal.dayOpen", json!({ "classId": class_id, "date": "2025-01-06" })),
        ("15", "grades.ranking", json!({ "classId": class_id })),
        ("16", "setup.get", json!({})),
    ];
    for (id, method, params) in calls {
        let _ = request_ok(&mut stdin, &mut reader, id, method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "17", "marksets.list", json!({}));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "18",
            "students.list",
            json!({ "classId": "missing" })
        ),
        "not_found"
    );

    drop(stdin);
    let _ = child.wait();
}
