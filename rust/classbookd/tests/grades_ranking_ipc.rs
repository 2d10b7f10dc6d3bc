mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{add_student, open_class, request_ok, spawn_sidecar};

/// Opens one component sheet, fills scores by roster position and saves.
fn save_sheet(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    class_id: &str,
    subject: &str,
    component: &str,
    scores: &[Option<f64>],
) -> serde_json::Value {
    let opened = request_ok(
        stdin,
        reader,
        "open",
        "grades.sheetOpen",
        json!({
            "classId": class_id,
            "subject": subject,
            "component": component,
            "date": "2025-01-06"
        }),
    );
    let mut rows = opened["rows"].as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), scores.len());
    for (row, score) in rows.iter_mut().zip(scores) {
        assert_eq!(row["origin"], json!("synthesizedFromTemplate"));
        row["payload"]["score"] = json!(score);
    }
    request_ok(
        stdin,
        reader,
        "save",
        "grades.sheetSave",
        json!({ "classId": class_id, "rows": rows }),
    )
}

fn ranks(result: &serde_json::Value) -> Vec<(String, serde_json::Value)> {
    result["rankings"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|r| {
            (
                r["displayName"].as_str().unwrap_or_default().to_string(),
                r["rank"].clone(),
            )
        })
        .collect()
}

#[test]
fn ranking_sums_subject_finals_and_leaves_empty_students_unranked() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let class_id = open_class(&mut stdin, &mut reader, "classbook-grades");
    let _ = add_student(&mut stdin, &mut reader, &class_id, "Alvarez", "Ana");
    let _ = add_student(&mut stdin, &mut reader, &class_id, "Baker", "Ben");
    let _ = add_student(&mut stdin, &mut reader, &class_id, "Cruz", "Cam");

    let quiz = save_sheet(
        &mut stdin,
        &mut reader,
        &class_id,
        "Math",
        "quiz",
        &[Some(80.0), Some(90.0), None],
    );
    assert_eq!(quiz["upserted"], json!(2));
    // Other components of the same subject and date stay out of this sheet.
    let _ = save_sheet(
        &mut stdin,
        &mut reader,
        &class_id,
        "Math",
        "midterm",
        &[Some(90.0), Some(70.0), None],
    );
    let _ = save_sheet(
        &mut stdin,
        &mut reader,
        &class_id,
        "English",
        "quiz",
        &[Some(70.0), None, None],
    );

    let ranking = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.ranking",
        json!({ "classId": class_id }),
    );
    let rows = ranking["rankings"].as_array().cloned().unwrap_or_default();
    assert_eq!(rows[0]["displayName"], json!("Alvarez, Ana"));
    assert_eq!(rows[0]["totalScore"], json!(155));
    assert_eq!(rows[0]["averageScore"], json!(77.5));
    assert_eq!(rows[1]["totalScore"], json!(80));
    assert_eq!(
        ranks(&ranking),
        vec![
            ("Alvarez, Ana".to_string(), json!(1)),
            ("Baker, Ben".to_string(), json!(2)),
            ("Cruz, Cam".to_string(), json!("-")),
        ]
    );

    // Out-of-range scores are clamped on save with a warning.
    let art = save_sheet(
        &mut stdin,
        &mut reader,
        &class_id,
        "Art",
        "project",
        &[None, None, Some(120.0)],
    );
    assert_eq!(art["upserted"], json!(1));
    assert_eq!(art["warnings"].as_array().map(|w| w.len()), Some(1));

    let ranking = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.ranking",
        json!({ "classId": class_id }),
    );
    assert_eq!(
        ranks(&ranking),
        vec![
            ("Alvarez, Ana".to_string(), json!(1)),
            ("Cruz, Cam".to_string(), json!(2)),
            ("Baker, Ben".to_string(), json!(3)),
        ]
    );
}
