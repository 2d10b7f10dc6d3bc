use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use super::error::EngineError;
use super::model::IdentityKey;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    Attendance,
    JournalEntry,
    GradeComponent,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Attendance => "attendance",
            RecordKind::JournalEntry => "journalEntry",
            RecordKind::GradeComponent => "gradeComponent",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour every record payload offers to the generic engine stages.
pub trait Payload: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned {
    const KIND: RecordKind;

    /// True when the payload equals what the template would synthesize for
    /// `key`, i.e. nothing a user entered.
    fn is_default_for(&self, key: &IdentityKey) -> bool;

    /// Propagation group of the row holding this payload, if any.
    fn group_key(&self) -> Option<&str> {
        None
    }

    /// Applies a single field edit, refreshing any derived fields.
    fn set_field(&mut self, field: &str, value: &JsonValue) -> Result<(), EngineError>;

    /// Brings values back into range. Returns a message when something changed.
    fn normalize(&mut self) -> Option<String> {
        None
    }

    fn into_record(self) -> RecordPayload;

    fn from_record(record: RecordPayload) -> Option<Self>;
}

/// Closed set of payload shapes, used where records of any kind are stored
/// side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RecordPayload {
    Attendance(AttendancePayload),
    JournalEntry(JournalPayload),
    GradeComponent(GradeComponentPayload),
}

impl RecordPayload {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::Attendance(_) => RecordKind::Attendance,
            RecordPayload::JournalEntry(_) => RecordKind::JournalEntry,
            RecordPayload::GradeComponent(_) => RecordKind::GradeComponent,
        }
    }
}

fn string_value(field: &str, value: &JsonValue) -> Result<String, EngineError> {
    match value {
        JsonValue::Null => Ok(String::new()),
        JsonValue::String(s) => Ok(s.clone()),
        _ => Err(EngineError::invalid_value(field, "must be string or null")),
    }
}

// ---------------------------------------------------------------------------
// Attendance

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceStatus {
    Present,
    Sick,
    Permit,
    Absent,
    Dispensation,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" | "h" => Some(AttendanceStatus::Present),
            "sick" | "s" => Some(AttendanceStatus::Sick),
            "permit" | "i" => Some(AttendanceStatus::Permit),
            "absent" | "a" => Some(AttendanceStatus::Absent),
            "dispensation" | "d" => Some(AttendanceStatus::Dispensation),
            _ => None,
        }
    }

    /// Present and dispensation both satisfy attendance for the day.
    pub fn is_satisfied(self) -> bool {
        matches!(
            self,
            AttendanceStatus::Present | AttendanceStatus::Dispensation
        )
    }
}

/// Whole-day mark for one student.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttendancePayload {
    pub status: Option<AttendanceStatus>,
    pub note: String,
}

impl Payload for AttendancePayload {
    const KIND: RecordKind = RecordKind::Attendance;

    fn is_default_for(&self, _key: &IdentityKey) -> bool {
        self.status.is_none() && self.note.trim().is_empty()
    }

    fn set_field(&mut self, field: &str, value: &JsonValue) -> Result<(), EngineError> {
        match field {
            "status" => {
                self.status = match value {
                    JsonValue::Null => None,
                    JsonValue::String(s) if s.trim().is_empty() => None,
                    JsonValue::String(s) => Some(AttendanceStatus::parse(s).ok_or_else(|| {
                        EngineError::invalid_value(
                            field,
                            "must be one of: present, sick, permit, absent, dispensation",
                        )
                    })?),
                    _ => return Err(EngineError::invalid_value(field, "must be string or null")),
                };
                Ok(())
            }
            "note" => {
                self.note = string_value(field, value)?;
                Ok(())
            }
            other => Err(EngineError::UnknownField {
                kind: Self::KIND.as_str(),
                field: other.to_string(),
            }),
        }
    }

    fn into_record(self) -> RecordPayload {
        RecordPayload::Attendance(self)
    }

    fn from_record(record: RecordPayload) -> Option<Self> {
        match record {
            RecordPayload::Attendance(p) => Some(p),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Learning journal

/// One journal line for a timetable slot. `activities` is a composite that is
/// rebuilt from subject, topic and method whenever one of them is edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JournalPayload {
    /// Display label. The row key keeps the template subject, so renaming
    /// here never moves the stored entry to another identity.
    pub subject: String,
    pub topic: String,
    pub method: String,
    pub activities: String,
    pub notes: String,
}

impl JournalPayload {
    pub fn for_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    fn refresh_activities(&mut self) {
        self.activities = compose_activities(&self.subject, &self.topic, &self.method);
    }
}

/// `"{subject}: {topic} ({method})"`, dropping whichever parts are blank.
/// Blank topic and method yield an empty summary.
pub fn compose_activities(subject: &str, topic: &str, method: &str) -> String {
    let (subject, topic, method) = (subject.trim(), topic.trim(), method.trim());
    if topic.is_empty() && method.is_empty() {
        return String::new();
    }
    let mut out = subject.to_string();
    if !topic.is_empty() {
        if !out.is_empty() {
            out.push_str(": ");
        }
        out.push_str(topic);
    }
    if !method.is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push('(');
        out.push_str(method);
        out.push(')');
    }
    out
}

impl Payload for JournalPayload {
    const KIND: RecordKind = RecordKind::JournalEntry;

    fn is_default_for(&self, key: &IdentityKey) -> bool {
        self.subject.trim() == key.entity_id.trim()
            && self.topic.trim().is_empty()
            && self.method.trim().is_empty()
            && self.activities.trim().is_empty()
            && self.notes.trim().is_empty()
    }

    fn group_key(&self) -> Option<&str> {
        Some(self.subject.trim()).filter(|s| !s.is_empty())
    }

    fn set_field(&mut self, field: &str, value: &JsonValue) -> Result<(), EngineError> {
        let text = string_value(field, value)?;
        match field {
            "subject" => self.subject = text,
            "topic" => self.topic = text,
            "method" => self.method = text,
            "activities" => {
                self.activities = text;
                return Ok(());
            }
            "notes" => {
                self.notes = text;
                return Ok(());
            }
            other => {
                return Err(EngineError::UnknownField {
                    kind: Self::KIND.as_str(),
                    field: other.to_string(),
                })
            }
        }
        self.refresh_activities();
        Ok(())
    }

    fn into_record(self) -> RecordPayload {
        RecordPayload::JournalEntry(self)
    }

    fn from_record(record: RecordPayload) -> Option<Self> {
        match record {
            RecordPayload::JournalEntry(p) => Some(p),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Grades

/// Score for one assessment component (quiz, midterm, ...) of a subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GradeComponentPayload {
    pub subject: String,
    pub component: String,
    pub score: Option<f64>,
}

impl GradeComponentPayload {
    pub fn new(subject: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            component: component.into(),
            score: None,
        }
    }
}

impl Payload for GradeComponentPayload {
    const KIND: RecordKind = RecordKind::GradeComponent;

    fn is_default_for(&self, key: &IdentityKey) -> bool {
        let slot = format!("{}:{}", self.subject.trim(), self.component.trim());
        self.score.is_none() && key.slot_key.as_deref().map(str::trim) == Some(slot.as_str())
    }

    fn set_field(&mut self, field: &str, value: &JsonValue) -> Result<(), EngineError> {
        match field {
            "score" => {
                self.score = match value {
                    JsonValue::Null => None,
                    JsonValue::Number(n) => n.as_f64(),
                    JsonValue::String(s) if s.trim().is_empty() => None,
                    JsonValue::String(s) => Some(
                        s.trim()
                            .parse::<f64>()
                            .map_err(|_| EngineError::invalid_value(field, "must be numeric"))?,
                    ),
                    _ => return Err(EngineError::invalid_value(field, "must be number or null")),
                };
                if self.score.is_some_and(|v| !v.is_finite()) {
                    return Err(EngineError::invalid_value(field, "must be finite"));
                }
                Ok(())
            }
            "subject" => {
                self.subject = string_value(field, value)?;
                Ok(())
            }
            "component" => {
                self.component = string_value(field, value)?;
                Ok(())
            }
            other => Err(EngineError::UnknownField {
                kind: Self::KIND.as_str(),
                field: other.to_string(),
            }),
        }
    }

    fn normalize(&mut self) -> Option<String> {
        let score = self.score?;
        if (SCORE_MIN..=SCORE_MAX).contains(&score) {
            return None;
        }
        let clamped = score.clamp(SCORE_MIN, SCORE_MAX);
        self.score = Some(clamped);
        Some(format!(
            "score {} outside {}-{}, clamped to {}",
            score, SCORE_MIN, SCORE_MAX, clamped
        ))
    }

    fn into_record(self) -> RecordPayload {
        RecordPayload::GradeComponent(self)
    }

    fn from_record(record: RecordPayload) -> Option<Self> {
        match record {
            RecordPayload::GradeComponent(p) => Some(p),
            _ => None,
        }
    }
}
