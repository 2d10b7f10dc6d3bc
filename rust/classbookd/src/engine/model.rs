use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::aggregate::Rank;
use super::date::CalendarDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HolidayCategory {
    National,
    MajorReligiousDay,
    JointLeave,
    SemesterBreak,
}

impl HolidayCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            HolidayCategory::National => "national",
            HolidayCategory::MajorReligiousDay => "majorReligiousDay",
            HolidayCategory::JointLeave => "jointLeave",
            HolidayCategory::SemesterBreak => "semesterBreak",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "national" => Some(HolidayCategory::National),
            "majorReligiousDay" => Some(HolidayCategory::MajorReligiousDay),
            "jointLeave" => Some(HolidayCategory::JointLeave),
            "semesterBreak" => Some(HolidayCategory::SemesterBreak),
            _ => None,
        }
    }
}

/// School-wide holiday. `date` stays a raw string: entries are owned by an
/// administrator screen and may hold anything, so parsing happens when the
/// calendar index is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayEntry {
    pub id: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
    pub category: HolidayCategory,
}

/// One cell of a weekly timetable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringSlot {
    pub id: String,
    pub weekday: u8,
    pub time_label: String,
    pub subject_or_category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterMember {
    pub id: String,
    pub display_name: String,
}

/// (entity, date, slot) identity shared by persisted overrides and the rows
/// materialized from them. `slot_key == None` marks whole-day records.
///
/// The date is kept as text so keys coming back from a client can be checked
/// (and rejected row by row) instead of failing deserialization of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityKey {
    pub entity_id: String,
    pub date: String,
    #[serde(default)]
    pub slot_key: Option<String>,
}

impl IdentityKey {
    pub fn new(entity_id: impl Into<String>, date: CalendarDate, slot_key: Option<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            date: date.to_string(),
            slot_key,
        }
        .normalized()
    }

    /// Trims the parts and folds an empty slot key into `None`.
    pub fn normalized(&self) -> Self {
        Self {
            entity_id: self.entity_id.trim().to_string(),
            date: self.date.trim().to_string(),
            slot_key: self
                .slot_key
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    /// Returns the parsed date, or the reason the key cannot address a record.
    pub fn validate(&self) -> Result<CalendarDate, String> {
        if self.entity_id.trim().is_empty() {
            return Err("missing entityId".to_string());
        }
        if self.date.trim().is_empty() {
            return Err("missing date".to_string());
        }
        CalendarDate::parse(&self.date).map_err(|e| e.to_string())
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}#{}",
            self.entity_id,
            self.date,
            self.slot_key.as_deref().unwrap_or("-")
        )
    }
}

/// A persisted, date-specific fact that wins over whatever the template says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord<P> {
    pub entity_id: String,
    pub date: CalendarDate,
    #[serde(default)]
    pub slot_key: Option<String>,
    pub payload: P,
}

impl<P> OverrideRecord<P> {
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(self.entity_id.clone(), self.date, self.slot_key.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowOrigin {
    FromOverride,
    SynthesizedFromTemplate,
    ManuallyAdded,
}

/// Editable working row. Never persisted as-is; committed through the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedRow<P> {
    pub key: IdentityKey,
    pub origin: RowOrigin,
    #[serde(default)]
    pub time_label: Option<String>,
    /// Set by the client when the row should be deleted on save.
    #[serde(default)]
    pub removed: bool,
    pub payload: P,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub entity_id: String,
    pub metrics: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<Rank>,
}
