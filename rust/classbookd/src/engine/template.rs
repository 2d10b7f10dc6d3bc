use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::date::CalendarDate;
use super::error::EngineError;
use super::model::{IdentityKey, RecurringSlot, RosterMember};

/// What the template (or roster) predicts for a single date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedOccurrence {
    pub entity_id: String,
    #[serde(default)]
    pub slot_key: Option<String>,
    pub subject_or_category: String,
    #[serde(default)]
    pub time_label: String,
}

/// Slots of `template` that fall on `date`'s weekday, ordered by time label.
///
/// Two slots with the same time and subject, or the same id, on one weekday
/// would produce indistinguishable rows and are rejected.
pub fn expand(
    template: &[RecurringSlot],
    date: CalendarDate,
) -> Result<Vec<ExpectedOccurrence>, EngineError> {
    let weekday = date.weekday();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_cells: HashSet<(&str, &str)> = HashSet::new();
    let mut out = Vec::new();

    for slot in template.iter().filter(|s| s.weekday == weekday) {
        let id = slot.id.trim();
        let subject = slot.subject_or_category.trim();
        let time = slot.time_label.trim();
        let key = || IdentityKey::new(subject, date, Some(id.to_string()));
        if !seen_ids.insert(id) {
            return Err(EngineError::IdentityConflict {
                key: key(),
                message: format!("slot id {:?} appears twice on weekday {}", id, weekday),
            });
        }
        if !seen_cells.insert((time, subject)) {
            return Err(EngineError::IdentityConflict {
                key: key(),
                message: format!(
                    "two slots for {:?} at {:?} on weekday {}",
                    subject, time, weekday
                ),
            });
        }
        out.push(ExpectedOccurrence {
            entity_id: subject.to_string(),
            slot_key: Some(id.to_string()).filter(|s| !s.is_empty()),
            subject_or_category: subject.to_string(),
            time_label: time.to_string(),
        });
    }

    out.sort_by(|a, b| a.time_label.cmp(&b.time_label));
    Ok(out)
}

/// Expansion for every day in `[start, end]`, excluded days included.
/// Callers decide whether holidays render an empty grid or are skipped.
pub fn expand_range(
    template: &[RecurringSlot],
    start: CalendarDate,
    end: CalendarDate,
) -> Result<BTreeMap<CalendarDate, Vec<ExpectedOccurrence>>, EngineError> {
    start
        .days_through(end)
        .map(|date| expand(template, date).map(|occ| (date, occ)))
        .collect()
}

/// One whole-day (or single-slot) occurrence per roster member, roster order.
pub fn expand_roster(
    roster: &[RosterMember],
    date: CalendarDate,
    slot_key: Option<&str>,
) -> Result<Vec<ExpectedOccurrence>, EngineError> {
    let slot_key = slot_key.map(str::trim).filter(|s| !s.is_empty());
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(roster.len());
    for member in roster {
        let id = member.id.trim();
        if !seen.insert(id) {
            return Err(EngineError::IdentityConflict {
                key: IdentityKey::new(id, date, slot_key.map(str::to_string)),
                message: format!("roster lists {:?} twice", id),
            });
        }
        out.push(ExpectedOccurrence {
            entity_id: id.to_string(),
            slot_key: slot_key.map(str::to_string),
            subject_or_category: member.display_name.clone(),
            time_label: String::new(),
        });
    }
    Ok(out)
}
