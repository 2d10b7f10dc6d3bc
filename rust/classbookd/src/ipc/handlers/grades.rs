use crate::db;
use crate::engine::{
    compute_ranks, expand_roster, subject_scores_from_grades, GradeComponentPayload, MatchPolicy,
    ReconciliationSession,
};
use crate::ipc::helpers::{
    commit_rows, ensure_class, parse_rows, required_date, required_str, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Slot key under which one component's scores are stored.
fn component_slot(subject: &str, component: &str) -> String {
    format!("{}:{}", subject, component)
}

fn grades_sheet_open(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let subject = required_str(params, "subject")?;
    let component = required_str(params, "component")?;
    let date = required_date(params, "date")?;
    ensure_class(conn, &class_id)?;

    let slot = component_slot(&subject, &component);
    let roster = db::fetch_roster(conn, &class_id).map_err(HandlerErr::query_failed)?;
    let expected = expand_roster(&roster, date, Some(&slot))?;
    let persisted: Vec<_> = db::fetch_overrides::<GradeComponentPayload>(conn, &class_id, date, date)
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .filter(|r| r.slot_key.as_deref() == Some(slot.as_str()))
        .collect();
    let session = ReconciliationSession::open(
        &expected,
        date,
        &persisted,
        MatchPolicy::BySlotKey,
        |_| GradeComponentPayload::new(subject.clone(), component.clone()),
    )?;

    Ok(json!({
        "date": date,
        "slotKey": slot,
        "rows": session.rows(),
    }))
}

fn grades_sheet_save(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;
    let rows = parse_rows::<GradeComponentPayload>(params, "rows")?;
    commit_rows(conn, &class_id, &rows)
}

fn grades_ranking(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;

    let roster = db::fetch_roster(conn, &class_id).map_err(HandlerErr::query_failed)?;
    let grades = db::fetch_all_overrides::<GradeComponentPayload>(conn, &class_id)
        .map_err(HandlerErr::query_failed)?;
    let scores = subject_scores_from_grades(&grades);
    let entities: Vec<String> = roster.iter().map(|s| s.id.clone()).collect();
    let ranks = compute_ranks(&entities, &scores);

    let names: HashMap<&str, &str> = roster
        .iter()
        .map(|s| (s.id.as_str(), s.display_name.as_str()))
        .collect();
    let rankings: Vec<Value> = ranks
        .iter()
        .map(|r| {
            json!({
                "studentId": r.entity_id,
                "displayName": names.get(r.entity_id.as_str()).copied().unwrap_or_default(),
                "totalScore": r.total_score,
                "scoredSubjectCount": r.scored_subject_count,
                "averageScore": r.average_score,
                "rank": r.rank,
            })
        })
        .collect();
    let results: Vec<_> = ranks.iter().map(|r| r.to_result()).collect();

    Ok(json!({ "rankings": rankings, "results": results }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.sheetOpen" => Some(with_conn(state, req, grades_sheet_open)),
        "grades.sheetSave" => Some(with_conn(state, req, grades_sheet_save)),
        "grades.ranking" => Some(with_conn(state, req, grades_ranking)),
        _ => None,
    }
}
