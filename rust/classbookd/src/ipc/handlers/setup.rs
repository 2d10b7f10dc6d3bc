use crate::db;
use crate::engine::MatchPolicy;
use crate::ipc::helpers::{with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Calendar,
    Journal,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(Self::Calendar),
            "journal" => Some(Self::Journal),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Calendar => "setup.calendar",
            Self::Journal => "setup.journal",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Calendar => json!({ "weekendDays": [0] }),
        SetupSection::Journal => json!({ "defaultMatchPolicy": MatchPolicy::default().as_str() }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_weekdays(v: &Value, key: &str) -> Result<Vec<u8>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array", key))?;
    let mut days = Vec::with_capacity(arr.len());
    for item in arr {
        let n = item
            .as_u64()
            .filter(|n| *n <= 6)
            .ok_or_else(|| format!("{} entries must be integers in 0..=6", key))?;
        days.push(n as u8);
    }
    // Sunday is always a weekend day.
    days.push(0);
    days.sort_unstable();
    days.dedup();
    Ok(days)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Calendar => match k.as_str() {
                "weekendDays" => {
                    obj.insert(k.clone(), json!(parse_weekdays(v, k)?));
                }
                _ => return Err(format!("unknown calendar field: {}", k)),
            },
            SetupSection::Journal => match k.as_str() {
                "defaultMatchPolicy" => {
                    let policy = v
                        .as_str()
                        .and_then(MatchPolicy::parse)
                        .ok_or_else(|| {
                            "defaultMatchPolicy must be one of: slotKey, subjectName".to_string()
                        })?;
                    obj.insert(k.clone(), Value::String(policy.as_str().to_string()));
                }
                _ => return Err(format!("unknown journal field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to defaults.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.key(), error = %e, "ignoring invalid saved setup");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CalendarSetup {
    pub weekend_days: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct JournalSetup {
    pub default_match_policy: MatchPolicy,
}

pub(crate) fn load_calendar_setup(conn: &Connection) -> CalendarSetup {
    let section = load_section(conn, SetupSection::Calendar).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "calendar setup unreadable, using defaults");
        default_section(SetupSection::Calendar)
    });
    let weekend_days = section
        .get("weekendDays")
        .and_then(|v| parse_weekdays(v, "weekendDays").ok())
        .unwrap_or_else(|| vec![0]);
    CalendarSetup { weekend_days }
}

pub(crate) fn load_journal_setup(conn: &Connection) -> JournalSetup {
    let default_match_policy = load_section(conn, SetupSection::Journal)
        .ok()
        .and_then(|v| {
            v.get("defaultMatchPolicy")
                .and_then(|p| p.as_str())
                .and_then(MatchPolicy::parse)
        })
        .unwrap_or_default();
    JournalSetup {
        default_match_policy,
    }
}

fn setup_get(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let calendar = load_section(conn, SetupSection::Calendar).map_err(HandlerErr::query_failed)?;
    let journal = load_section(conn, SetupSection::Journal).map_err(HandlerErr::query_failed)?;
    Ok(json!({
        "calendar": calendar,
        "journal": journal
    }))
}

fn setup_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let Some(section_raw) = params.get("section").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing section"));
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return Err(HandlerErr::bad_params("unknown section"));
    };
    let Some(patch_obj) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = load_section(conn, section).map_err(HandlerErr::query_failed)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::update_failed(e, "settings"))?;
    tracing::info!(section = section.key(), "setup updated");
    Ok(json!({ "ok": true, "section": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(with_conn(state, req, setup_get)),
        "setup.update" => Some(with_conn(state, req, setup_update)),
        _ => None,
    }
}
