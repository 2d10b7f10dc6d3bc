use crate::db;
use crate::engine::{
    expand, propagate_by_payload_group, JournalPayload, MatchPolicy, ReconciliationSession,
};
use crate::ipc::handlers::setup::load_journal_setup;
use crate::ipc::helpers::{
    commit_rows, ensure_class, load_calendar, optional_str, parse_rows, required_date,
    required_str, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn parse_index(params: &Value) -> Result<usize, HandlerErr> {
    params
        .get("index")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .ok_or_else(|| HandlerErr::bad_params("index must be a non-negative integer"))
}

fn match_policy(conn: &Connection, params: &Value) -> Result<MatchPolicy, HandlerErr> {
    match optional_str(params, "matchPolicy")? {
        Some(raw) => MatchPolicy::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("matchPolicy must be one of: slotKey, subjectName")),
        None => Ok(load_journal_setup(conn).default_match_policy),
    }
}

/// Rows a client holds for `date`, re-wrapped so session operations apply.
fn session_from_params(params: &Value) -> Result<ReconciliationSession<JournalPayload>, HandlerErr> {
    let date = required_date(params, "date")?;
    let rows = parse_rows::<JournalPayload>(params, "rows")?;
    Ok(ReconciliationSession::from_rows(date, MatchPolicy::default(), rows))
}

fn journal_day_open(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    let policy = match_policy(conn, params)?;
    ensure_class(conn, &class_id)?;

    let template = db::fetch_weekly_template(conn, &class_id).map_err(HandlerErr::query_failed)?;
    let expected = expand(&template, date)?;
    let persisted = db::fetch_overrides::<JournalPayload>(conn, &class_id, date, date)
        .map_err(HandlerErr::query_failed)?;
    let session = ReconciliationSession::open(&expected, date, &persisted, policy, |occ| {
        JournalPayload::for_subject(occ.subject_or_category.clone())
    })?;

    let classification = load_calendar(conn)?.classify(date);
    tracing::debug!(
        %class_id,
        %date,
        policy = policy.as_str(),
        rows = session.rows().len(),
        "journal day opened"
    );
    Ok(json!({
        "date": date,
        "matchPolicy": policy,
        "classification": classification,
        "rows": session.rows(),
    }))
}

/// Pure: applies one field edit across the edited row's subject group.
fn journal_propagate(params: &Value) -> Result<Value, HandlerErr> {
    let rows = parse_rows::<JournalPayload>(params, "rows")?;
    let index = parse_index(params)?;
    let field = required_str(params, "field")?;
    let value = params.get("value").cloned().unwrap_or(Value::Null);
    let rows = propagate_by_payload_group(&rows, index, &field, &value)?;
    Ok(json!({ "rows": rows }))
}

fn journal_add_row(params: &Value) -> Result<Value, HandlerErr> {
    let session = session_from_params(params)?;
    let subject = required_str(params, "subject")?;
    let slot_key = optional_str(params, "slotKey")?;
    let session =
        session.add_manual_row(&subject, slot_key, JournalPayload::for_subject(subject.clone()))?;
    Ok(json!({ "rows": session.rows() }))
}

fn journal_remove_row(params: &Value) -> Result<Value, HandlerErr> {
    let session = session_from_params(params)?;
    let index = parse_index(params)?;
    let session = session.mark_removed(index)?;
    Ok(json!({ "rows": session.rows() }))
}

fn journal_day_save(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    ensure_class(conn, &class_id)?;
    let rows = parse_rows::<JournalPayload>(params, "rows")?;
    commit_rows(conn, &class_id, &rows)
}

fn pure(req: &Request, f: fn(&Value) -> Result<Value, HandlerErr>) -> serde_json::Value {
    match f(&req.params) {
        Ok(result) => crate::ipc::error::ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "journal.dayOpen" => Some(with_conn(state, req, journal_day_open)),
        "journal.propagate" => Some(pure(req, journal_propagate)),
        "journal.addRow" => Some(pure(req, journal_add_row)),
        "journal.removeRow" => Some(pure(req, journal_remove_row)),
        "journal.daySave" => Some(with_conn(state, req, journal_day_save)),
        _ => None,
    }
}
