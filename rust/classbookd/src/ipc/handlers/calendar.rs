use crate::db;
use crate::engine::HolidayCategory;
use crate::ipc::helpers::{
    load_calendar, optional_str, required_date, required_range, required_str, with_conn, HandlerErr,
};
use crate::ipc::error::codes;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn holidays_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let holidays = db::fetch_holidays(conn).map_err(HandlerErr::query_failed)?;
    let calendar = load_calendar(conn)?;
    Ok(json!({
        "holidays": holidays,
        "weekendDays": calendar.weekend_days(),
        "warnings": calendar.warnings(),
    }))
}

fn holidays_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let date = required_date(params, "date")?;
    let category_raw = required_str(params, "category")?;
    let Some(category) = HolidayCategory::parse(&category_raw) else {
        return Err(HandlerErr::bad_params(
            "category must be one of: national, majorReligiousDay, jointLeave, semesterBreak",
        ));
    };
    let description = optional_str(params, "description")?.unwrap_or_default();
    let holiday_id = optional_str(params, "holidayId")?.unwrap_or_else(|| Uuid::new_v4().to_string());

    // The index honours only the first entry per date, so a second one would
    // be silently ignored.
    let clash: Option<String> = conn
        .query_row(
            "SELECT id FROM holidays WHERE date = ? AND id <> ? LIMIT 1",
            (date.to_string(), &holiday_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query_failed)?;
    if let Some(existing) = clash {
        return Err(HandlerErr::new(codes::IDENTITY_CONFLICT, "a holiday already exists on that date")
            .with_details(json!({ "holidayId": existing, "date": date })));
    }

    conn.execute(
        "INSERT INTO holidays(id, date, description, category, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           date = excluded.date,
           description = excluded.description,
           category = excluded.category,
           updated_at = excluded.updated_at",
        (
            &holiday_id,
            date.to_string(),
            &description,
            category.as_str(),
            db::now_ts(),
        ),
    )
    .map_err(|e| HandlerErr::update_failed(e, "holidays"))?;

    tracing::info!(%holiday_id, %date, category = category.as_str(), "holiday saved");
    Ok(json!({ "holidayId": holiday_id }))
}

fn holidays_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let holiday_id = required_str(params, "holidayId")?;
    let deleted = conn
        .execute("DELETE FROM holidays WHERE id = ?", [&holiday_id])
        .map_err(|e| HandlerErr::update_failed(e, "holidays"))?;
    if deleted == 0 {
        return Err(HandlerErr::new(codes::NOT_FOUND, "holiday not found"));
    }
    Ok(json!({ "ok": true }))
}

fn calendar_classify(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let date = required_date(params, "date")?;
    let calendar = load_calendar(conn)?;
    let classification = calendar.classify(date);
    Ok(json!({
        "date": date,
        "weekday": date.weekday(),
        "excluded": classification.excluded,
        "reason": classification.reason,
    }))
}

fn calendar_range(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let (start, end) = required_range(params)?;
    let calendar = load_calendar(conn)?;
    let days: Vec<Value> = calendar
        .classify_range(start, end)
        .into_iter()
        .map(|(date, c)| {
            json!({
                "date": date,
                "weekday": date.weekday(),
                "excluded": c.excluded,
                "reason": c.reason,
            })
        })
        .collect();
    Ok(json!({
        "days": days,
        "effectiveDayCount": calendar.effective_day_count(start, end),
        "warnings": calendar.warnings(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "holidays.list" => Some(with_conn(state, req, holidays_list)),
        "holidays.upsert" => Some(with_conn(state, req, holidays_upsert)),
        "holidays.delete" => Some(with_conn(state, req, holidays_delete)),
        "calendar.classify" => Some(with_conn(state, req, calendar_classify)),
        "calendar.range" => Some(with_conn(state, req, calendar_range)),
        _ => None,
    }
}
