use crate::db;
use crate::engine::aggregate::round_1;
use crate::engine::{
    compute_attendance_stats, expand_roster, AttendancePayload, MatchPolicy, ReconciliationSession,
};
use crate::ipc::helpers::{
    commit_rows, ensure_class, load_calendar, optional_str, parse_rows, required_date,
    required_range, required_str, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

/// Roster rows for one day, merged with whatever marks exist.
///
/// `slotKey` selects a per-lesson register; without it the register is
/// whole-day. Marks recorded under a different slot do not belong to this
/// register and are left out.
fn attendance_day_open(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    let slot_key = optional_str(params, "slotKey")?;
    ensure_class(conn, &class_id)?;

    let roster = db::fetch_roster(conn, &class_id).map_err(HandlerErr::query_failed)?;
    let expected = expand_roster(&roster, date, slot_key.as_deref())?;
    let persisted: Vec<_> = db::fetch_overrides::<AttendancePayload>(conn, &class_id, date, date)
        .map_err(HandlerErr::query_failed)?
        .into_iter()
        .filter(|r| r.slot_key == slot_key)
        .collect();
    let session = ReconciliationSession::open(
        &expected,
        date,
        &persisted,
        MatchPolicy::BySlotKey,
        |_| AttendancePayload::default(),
    )?;

    let classification = load_calendar(conn)?.classify(date);
    let students: Vec<Value> = roster
        .iter()
        .map(|s| json!({ "id": s.id, "displayName": s.display_name }))
        .collect();
    Ok(json!({
        "date": date,
        "classification": classification,
        "students": students,
        "rows": session.rows(),
    }))
}

fn attendance_day_save(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;
    let rows = parse_rows::<AttendancePayload>(params, "rows")?;
    commit_rows(conn, &class_id, &rows)
}

fn attendance_recap(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let (start, end) = required_range(params)?;
    ensure_class(conn, &class_id)?;

    let roster = db::fetch_roster(conn, &class_id).map_err(HandlerErr::query_failed)?;
    let entities: Vec<String> = roster.iter().map(|s| s.id.clone()).collect();
    let overrides = db::fetch_overrides::<AttendancePayload>(conn, &class_id, start, end)
        .map_err(HandlerErr::query_failed)?;
    let calendar = load_calendar(conn)?;
    let recap = compute_attendance_stats(&entities, start, end, &overrides, &calendar);

    let students: Vec<Value> = roster
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "displayName": s.display_name,
                "counts": recap.get(&s.id).map(|e| e.counts),
                "presenceRate": recap.presence_rate(&s.id).map(round_1),
            })
        })
        .collect();
    let results: Vec<_> = recap.to_results().into_values().collect();
    let rates = recap.classroom_rates();

    tracing::debug!(
        %class_id,
        %start,
        %end,
        effective_days = recap.effective_day_count,
        "attendance recap computed"
    );
    Ok(json!({
        "start": start,
        "end": end,
        "effectiveDayCount": recap.effective_day_count,
        "students": students,
        "totals": recap.totals(),
        "classroomRates": {
            "presence": round_1(rates.presence),
            "sick": round_1(rates.sick),
            "permit": round_1(rates.permit),
            "absent": round_1(rates.absent),
        },
        "results": results,
        "warnings": recap.warnings,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.dayOpen" => Some(with_conn(state, req, attendance_day_open)),
        "attendance.daySave" => Some(with_conn(state, req, attendance_day_save)),
        "attendance.recap" => Some(with_conn(state, req, attendance_recap)),
        _ => None,
    }
}
