mod test_support;

use serde_json::json;
use test_support::{open_class, request_err, request_ok, spawn_sidecar};

#[test]
fn schedule_upsert_normalizes_and_rejects_duplicates() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let class_id = open_class(&mut stdin, &mut reader, "classbook-schedule");

    let math = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.upsert",
        json!({ "classId": class_id, "weekday": 1, "timeLabel": "8:00", "subject": "Math" }),
    );
    assert_eq!(math["timeLabel"], json!("08:00"));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.upsert",
        json!({ "classId": class_id, "weekday": 1, "timeLabel": "07:00", "subject": "English" }),
    );

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "schedule.upsert",
            json!({ "classId": class_id, "weekday": 1, "timeLabel": "08:00", "subject": "Math" }),
        ),
        "identity_conflict"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "schedule.upsert",
            json!({ "classId": class_id, "weekday": 7, "timeLabel": "08:00", "subject": "Art" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "5",
            "schedule.upsert",
            json!({ "classId": class_id, "weekday": 2, "timeLabel": "25:00", "subject": "Art" }),
        ),
        "bad_params"
    );

    // 2025-01-06 is a Monday; expansion is ordered by time label.
    let expanded = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.expand",
        json!({ "classId": class_id, "date": "2025-01-06" }),
    );
    let occ = expanded["occurrences"].as_array().cloned().unwrap_or_default();
    assert_eq!(occ.len(), 2);
    assert_eq!(occ[0]["subjectOrCategory"], json!("English"));
    assert_eq!(occ[1]["subjectOrCategory"], json!("Math"));
    assert_eq!(occ[1]["slotKey"], math["slotId"]);

    let tuesday = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.expand",
        json!({ "classId": class_id, "date": "2025-01-07" }),
    );
    assert_eq!(tuesday["occurrences"], json!([]));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.delete",
        json!({ "classId": class_id, "slotId": math["slotId"] }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "schedule.list",
        json!({ "classId": class_id }),
    );
    assert_eq!(listed["slots"].as_array().map(|s| s.len()), Some(1));
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "10",
            "schedule.delete",
            json!({ "classId": class_id, "slotId": math["slotId"] }),
        ),
        "not_found"
    );
}
