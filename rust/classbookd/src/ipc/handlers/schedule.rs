use crate::db;
use crate::engine::{expand, RecurringSlot};
use crate::ipc::helpers::{
    ensure_class, load_calendar, required_date, required_str, with_conn, HandlerErr,
};
use crate::ipc::error::codes;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

/// Accepts `H:MM` or `HH:MM` (24h) and returns the zero-padded form so
/// labels sort chronologically as strings.
fn normalize_time_label(raw: &str) -> Option<String> {
    let (h, m) = raw.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{:02}:{:02}", hour, minute))
}

fn parse_weekday(params: &Value) -> Result<u8, HandlerErr> {
    params
        .get("weekday")
        .and_then(|v| v.as_u64())
        .filter(|n| *n <= 6)
        .map(|n| n as u8)
        .ok_or_else(|| HandlerErr::bad_params("weekday must be an integer in 0..=6"))
}

fn slot_json(slot: &RecurringSlot) -> Value {
    json!({
        "slotId": slot.id,
        "weekday": slot.weekday,
        "timeLabel": slot.time_label,
        "subject": slot.subject_or_category,
    })
}

fn schedule_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;
    let slots = db::fetch_weekly_template(conn, &class_id).map_err(HandlerErr::query_failed)?;
    let slots: Vec<Value> = slots.iter().map(slot_json).collect();
    Ok(json!({ "slots": slots }))
}

fn schedule_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let weekday = parse_weekday(params)?;
    let time_raw = required_str(params, "timeLabel")?;
    let Some(time_label) = normalize_time_label(&time_raw) else {
        return Err(HandlerErr::bad_params("timeLabel must be HH:MM"));
    };
    let subject = required_str(params, "subject")?;
    ensure_class(conn, &class_id)?;

    let slot_id = match params.get("slotId").and_then(|v| v.as_str()) {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => Uuid::new_v4().to_string(),
    };

    // Same weekday, time and subject would expand into indistinguishable rows.
    let clash: Option<String> = conn
        .query_row(
            "SELECT id FROM schedule_slots
             WHERE class_id = ? AND weekday = ? AND time_label = ? AND subject = ? AND id <> ?
             LIMIT 1",
            (&class_id, i64::from(weekday), &time_label, &subject, &slot_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query_failed)?;
    if let Some(existing) = clash {
        return Err(HandlerErr::new(
            codes::IDENTITY_CONFLICT,
            format!("{} already scheduled at {} on weekday {}", subject, time_label, weekday),
        )
        .with_details(json!({ "slotId": existing })));
    }

    let written = conn.execute(
        "INSERT INTO schedule_slots(id, class_id, weekday, time_label, subject, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           weekday = excluded.weekday,
           time_label = excluded.time_label,
           subject = excluded.subject,
           updated_at = excluded.updated_at
         WHERE schedule_slots.class_id = excluded.class_id",
        (
            &slot_id,
            &class_id,
            i64::from(weekday),
            &time_label,
            &subject,
            db::now_ts(),
        ),
    )
    .map_err(|e| HandlerErr::update_failed(e, "schedule_slots"))?;
    if written == 0 {
        return Err(HandlerErr::new(codes::NOT_FOUND, "slot belongs to another class"));
    }

    Ok(json!({ "slotId": slot_id, "timeLabel": time_label }))
}

fn schedule_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let slot_id = required_str(params, "slotId")?;
    let deleted = conn
        .execute(
            "DELETE FROM schedule_slots WHERE class_id = ? AND id = ?",
            (&class_id, &slot_id),
        )
        .map_err(|e| HandlerErr::update_failed(e, "schedule_slots"))?;
    if deleted == 0 {
        return Err(HandlerErr::new(codes::NOT_FOUND, "slot not found"));
    }
    Ok(json!({ "ok": true }))
}

/// Expected occurrences for one date. Excluded days still expand; the
/// classification rides along so callers can decide how to render them.
fn schedule_expand(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    ensure_class(conn, &class_id)?;
    let template = db::fetch_weekly_template(conn, &class_id).map_err(HandlerErr::query_failed)?;
    let occurrences = expand(&template, date)?;
    let classification = load_calendar(conn)?.classify(date);
    Ok(json!({
        "date": date,
        "classification": classification,
        "occurrences": occurrences,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.list" => Some(with_conn(state, req, schedule_list)),
        "schedule.upsert" => Some(with_conn(state, req, schedule_upsert)),
        "schedule.delete" => Some(with_conn(state, req, schedule_delete)),
        "schedule.expand" => Some(with_conn(state, req, schedule_expand)),
        _ => None,
    }
}
