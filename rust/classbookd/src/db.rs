use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::engine::{
    CalendarDate, HolidayCategory, HolidayEntry, OverrideRecord, Payload, RecordPayload,
    RecurringSlot, RosterMember, UpsertPlan,
};

pub const DB_FILE_NAME: &str = "classbook.sqlite3";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    // Holidays are school-wide, not per class.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS holidays(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_holidays_date ON holidays(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_slots(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            weekday INTEGER NOT NULL,
            time_label TEXT NOT NULL,
            subject TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_slots_class ON schedule_slots(class_id, weekday)",
        [],
    )?;

    // One row per (class, kind, date, entity, slot). SQLite treats NULLs as
    // distinct in keys, so a whole-day record stores '' as its slot key.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS override_records(
            class_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            date TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            slot_key TEXT NOT NULL DEFAULT '',
            payload_json TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(class_id, kind, date, entity_id, slot_key),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_override_records_range ON override_records(class_id, kind, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    tracing::info!(workspace = %workspace.display(), "opened workspace database");
    Ok(conn)
}

pub fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn class_exists(conn: &Connection, class_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

pub fn fetch_roster(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<RosterMember>> {
    let mut stmt = conn.prepare(
        "SELECT id, last_name, first_name
         FROM students
         WHERE class_id = ? AND active = 1
         ORDER BY sort_order",
    )?;
    stmt.query_map([class_id], |r| {
        let last: String = r.get(1)?;
        let first: String = r.get(2)?;
        Ok(RosterMember {
            id: r.get(0)?,
            display_name: format!("{}, {}", last, first),
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

/// Holidays in insertion order. Entries whose category is no longer known are
/// skipped; malformed dates are left for the calendar index to report.
pub fn fetch_holidays(conn: &Connection) -> rusqlite::Result<Vec<HolidayEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, description, category
         FROM holidays
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, date, description, category) in rows {
        let Some(category) = HolidayCategory::parse(&category) else {
            tracing::warn!(holiday_id = %id, %category, "skipping holiday with unknown category");
            continue;
        };
        out.push(HolidayEntry {
            id,
            date,
            description,
            category,
        });
    }
    Ok(out)
}

pub fn fetch_weekly_template(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<RecurringSlot>> {
    let mut stmt = conn.prepare(
        "SELECT id, weekday, time_label, subject
         FROM schedule_slots
         WHERE class_id = ?
         ORDER BY weekday, time_label, rowid",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, weekday, time_label, subject)| {
            let weekday = u8::try_from(weekday).ok().filter(|d| *d <= 6)?;
            Some(RecurringSlot {
                id,
                weekday,
                time_label,
                subject_or_category: subject,
            })
        })
        .collect())
}

type RawOverride = (String, String, String, String);

fn raw_override(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawOverride> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
}

/// Decodes stored rows of kind `P`. Undecodable rows are skipped with a warning.
fn decode_overrides<P: Payload>(rows: Vec<RawOverride>) -> Vec<OverrideRecord<P>> {
    let mut out = Vec::with_capacity(rows.len());
    for (date_raw, entity_id, slot_key, payload_json) in rows {
        let Ok(date) = CalendarDate::parse(&date_raw) else {
            tracing::warn!(%entity_id, date = %date_raw, "skipping override with unparseable date");
            continue;
        };
        let payload = serde_json::from_str::<RecordPayload>(&payload_json)
            .ok()
            .and_then(P::from_record);
        let Some(payload) = payload else {
            tracing::warn!(%entity_id, %date, kind = %P::KIND, "skipping override with undecodable payload");
            continue;
        };
        out.push(OverrideRecord {
            entity_id,
            date,
            slot_key: Some(slot_key).filter(|s| !s.is_empty()),
            payload,
        });
    }
    out
}

/// Persisted overrides of kind `P` for `[start, end]`, in date then
/// insertion order.
pub fn fetch_overrides<P: Payload>(
    conn: &Connection,
    class_id: &str,
    start: CalendarDate,
    end: CalendarDate,
) -> rusqlite::Result<Vec<OverrideRecord<P>>> {
    let mut stmt = conn.prepare(
        "SELECT date, entity_id, slot_key, payload_json
         FROM override_records
         WHERE class_id = ? AND kind = ? AND date >= ? AND date <= ?
         ORDER BY date, rowid",
    )?;
    let rows = stmt
        .query_map(
            params![class_id, P::KIND.as_str(), start.to_string(), end.to_string()],
            raw_override,
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(decode_overrides(rows))
}

/// Every persisted override of kind `P` for the class, whatever its date.
pub fn fetch_all_overrides<P: Payload>(
    conn: &Connection,
    class_id: &str,
) -> rusqlite::Result<Vec<OverrideRecord<P>>> {
    let mut stmt = conn.prepare(
        "SELECT date, entity_id, slot_key, payload_json
         FROM override_records
         WHERE class_id = ? AND kind = ?
         ORDER BY date, rowid",
    )?;
    let rows = stmt
        .query_map(params![class_id, P::KIND.as_str()], raw_override)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(decode_overrides(rows))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub upserted: usize,
    pub deleted: usize,
}

/// Applies a plan atomically. Upserts overwrite by key, never accumulate.
pub fn commit_upsert_plan<P: Payload>(
    conn: &Connection,
    class_id: &str,
    plan: &UpsertPlan<P>,
) -> Result<CommitSummary, PersistenceError> {
    let kind = P::KIND.as_str();
    let ts = now_ts();
    let tx = conn.unchecked_transaction()?;
    let mut summary = CommitSummary::default();

    for record in &plan.to_upsert {
        let payload_json = serde_json::to_string(&record.payload.clone().into_record())?;
        tx.execute(
            "INSERT INTO override_records(class_id, kind, date, entity_id, slot_key, payload_json, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(class_id, kind, date, entity_id, slot_key) DO UPDATE SET
               payload_json = excluded.payload_json,
               updated_at = excluded.updated_at",
            params![
                class_id,
                kind,
                record.date.to_string(),
                record.entity_id,
                record.slot_key.as_deref().unwrap_or(""),
                payload_json,
                ts
            ],
        )?;
        summary.upserted += 1;
    }
    for key in &plan.to_delete {
        summary.deleted += tx.execute(
            "DELETE FROM override_records
             WHERE class_id = ? AND kind = ? AND date = ? AND entity_id = ? AND slot_key = ?",
            params![
                class_id,
                kind,
                key.date,
                key.entity_id,
                key.slot_key.as_deref().unwrap_or("")
            ],
        )?;
    }
    tx.commit()?;

    tracing::info!(
        class_id,
        kind,
        upserted = summary.upserted,
        deleted = summary.deleted,
        "committed upsert plan"
    );
    Ok(summary)
}
