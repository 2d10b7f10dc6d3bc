use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use std::fmt::Display;

use crate::db::{self, PersistenceError};
use crate::engine::{CalendarDate, CalendarIndex, EngineError, MaterializedRow, Payload};
use crate::ipc::error::{codes, err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, Request};

pub(crate) struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<JsonValue>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new(codes::BAD_PARAMS, message)
    }

    pub fn query_failed(e: impl Display) -> Self {
        Self::new(codes::DB_QUERY_FAILED, e.to_string())
    }

    pub fn update_failed(e: impl Display, table: &str) -> Self {
        Self::new(codes::DB_UPDATE_FAILED, e.to_string()).with_details(json!({ "table": table }))
    }

    pub fn response(self, id: &str) -> JsonValue {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        let details = match &e {
            EngineError::IdentityConflict { key, .. } => Some(json!({ "key": key })),
            EngineError::RowIndexOutOfRange { index, len } => {
                Some(json!({ "index": index, "len": len }))
            }
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<PersistenceError> for HandlerErr {
    fn from(e: PersistenceError) -> Self {
        tracing::error!(error = %e, "commit failed");
        Self::new(codes::PERSISTENCE_FAILED, e.to_string()).with_details(json!({ "retryable": true }))
    }
}

/// Runs `f` against the open workspace and wraps the outcome in a response.
pub(crate) fn with_conn<F>(state: &AppState, req: &Request, f: F) -> JsonValue
where
    F: FnOnce(&Connection, &JsonValue) -> Result<JsonValue, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, codes::NO_WORKSPACE, "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            tracing::debug!(method = %req.method, code = error.code, message = %error.message, "request failed");
            error.response(&req.id)
        }
    }
}

pub(crate) fn required_str(params: &JsonValue, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub(crate) fn optional_str(params: &JsonValue, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub(crate) fn required_date(params: &JsonValue, key: &str) -> Result<CalendarDate, HandlerErr> {
    let raw = required_str(params, key)?;
    CalendarDate::parse(&raw).map_err(|e| HandlerErr::bad_params(format!("{}: {}", key, e)))
}

/// `[start, end]` from params, rejecting reversed ranges.
/// Longest `start..=end` span a ranged request may cover, so a typo in the
/// year cannot build a multi-century response.
pub(crate) const MAX_RANGE_DAYS: usize = 400;

pub(crate) fn required_range(params: &JsonValue) -> Result<(CalendarDate, CalendarDate), HandlerErr> {
    let start = required_date(params, "start")?;
    let end = required_date(params, "end")?;
    if end < start {
        return Err(HandlerErr::bad_params("end must not precede start"));
    }
    if start.days_through(end).nth(MAX_RANGE_DAYS).is_some() {
        return Err(HandlerErr::bad_params(format!(
            "range must not exceed {} days",
            MAX_RANGE_DAYS
        )));
    }
    Ok((start, end))
}

pub(crate) fn ensure_class(conn: &Connection, class_id: &str) -> Result<(), HandlerErr> {
    if db::class_exists(conn, class_id).map_err(HandlerErr::query_failed)? {
        Ok(())
    } else {
        Err(HandlerErr::new(codes::NOT_FOUND, "class not found"))
    }
}

/// Holiday index with the configured weekend days applied.
pub(crate) fn load_calendar(conn: &Connection) -> Result<CalendarIndex, HandlerErr> {
    let holidays = db::fetch_holidays(conn).map_err(HandlerErr::query_failed)?;
    let calendar_setup = setup::load_calendar_setup(conn);
    Ok(CalendarIndex::new(&holidays).with_weekend_days(&calendar_setup.weekend_days))
}

pub(crate) fn parse_rows<P>(params: &JsonValue, key: &str) -> Result<Vec<MaterializedRow<P>>, HandlerErr>
where
    P: DeserializeOwned,
{
    let Some(raw) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("{} is not a valid row list: {}", key, e)))
}

/// Plans `rows` against a fresh snapshot and commits the result.
///
/// The snapshot spans every date the rows address, so retrying after a
/// failed commit recomputes the plan from current state.
pub(crate) fn commit_rows<P: Payload>(
    conn: &Connection,
    class_id: &str,
    rows: &[MaterializedRow<P>],
) -> Result<JsonValue, HandlerErr> {
    let dates: Vec<CalendarDate> = rows.iter().filter_map(|r| r.key.validate().ok()).collect();
    let snapshot = match (dates.iter().min(), dates.iter().max()) {
        (Some(start), Some(end)) => {
            db::fetch_overrides::<P>(conn, class_id, *start, *end).map_err(HandlerErr::query_failed)?
        }
        _ => Vec::new(),
    };
    let plan = crate::engine::plan(rows, &snapshot);
    let summary = db::commit_upsert_plan(conn, class_id, &plan)?;
    Ok(json!({
        "upserted": summary.upserted,
        "deleted": summary.deleted,
        "warnings": plan.warnings,
    }))
}
