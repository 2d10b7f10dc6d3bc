mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn holidays_drive_classification_and_effective_days() {
    let workspace = temp_dir("classbook-calendar");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "holidays.upsert",
        json!({ "date": "2025-01-01", "category": "national", "description": "New Year" }),
    );
    let holiday_id = saved
        .get("holidayId")
        .and_then(|v| v.as_str())
        .expect("holidayId")
        .to_string();

    let new_year = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.classify",
        json!({ "date": "2025-01-01" }),
    );
    assert_eq!(new_year["excluded"], json!(true));
    assert_eq!(new_year["reason"], json!("national"));

    let sunday = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.classify",
        json!({ "date": "2025-01-05" }),
    );
    assert_eq!(sunday["excluded"], json!(true));
    assert_eq!(sunday["reason"], json!("weekend"));
    assert_eq!(sunday["weekday"], json!(0));

    let monday = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.classify",
        json!({ "date": "2025-01-06" }),
    );
    assert_eq!(monday["excluded"], json!(false));
    assert!(monday.get("reason").map(|v| v.is_null()).unwrap_or(true));

    // Jan 1-7 2025: Jan 1 is a holiday and Jan 5 a Sunday.
    let week = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "calendar.range",
        json!({ "start": "2025-01-01", "end": "2025-01-07" }),
    );
    assert_eq!(week["effectiveDayCount"], json!(5));
    assert_eq!(week["days"].as_array().map(|d| d.len()), Some(7));

    // A second holiday on the same date would be ignored by the index.
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "7",
            "holidays.upsert",
            json!({ "date": "2025-01-01", "category": "jointLeave" }),
        ),
        "identity_conflict"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "holidays.upsert",
            json!({ "date": "2025-13-01", "category": "national" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "9",
            "holidays.upsert",
            json!({ "date": "2025-01-02", "category": "picnic" }),
        ),
        "bad_params"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "holidays.delete",
        json!({ "holidayId": holiday_id }),
    );
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "calendar.classify",
        json!({ "date": "2025-01-01" }),
    );
    assert_eq!(after["excluded"], json!(false));
}

#[test]
fn configured_saturday_weekend_is_excluded() {
    let workspace = temp_dir("classbook-calendar-weekend");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let saturday = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.classify",
        json!({ "date": "2025-01-04" }),
    );
    assert_eq!(saturday["excluded"], json!(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "calendar", "patch": { "weekendDays": [6] } }),
    );
    let saturday = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calendar.classify",
        json!({ "date": "2025-01-04" }),
    );
    assert_eq!(saturday["reason"], json!("weekend"));
    let sunday = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calendar.classify",
        json!({ "date": "2025-01-05" }),
    );
    assert_eq!(sunday["reason"], json!("weekend"));
}
