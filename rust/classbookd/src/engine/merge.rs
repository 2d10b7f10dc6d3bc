use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::date::CalendarDate;
use super::error::EngineError;
use super::model::{IdentityKey, MaterializedRow, OverrideRecord, RowOrigin};
use super::payload::Payload;
use super::template::ExpectedOccurrence;

/// How persisted overrides are paired with expected occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPolicy {
    /// Entity and slot key must both equal the occurrence's.
    #[serde(rename = "slotKey")]
    BySlotKey,
    /// Entity (subject) name alone decides; an override on the same slot is
    /// preferred when several carry the name. A renamed subject no longer
    /// matches and its old overrides come back as manually added rows.
    #[default]
    #[serde(rename = "subjectName")]
    BySubjectName,
}

impl MatchPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "slotKey" => Some(MatchPolicy::BySlotKey),
            "subjectName" => Some(MatchPolicy::BySubjectName),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchPolicy::BySlotKey => "slotKey",
            MatchPolicy::BySubjectName => "subjectName",
        }
    }
}

fn same_slot(occ: &ExpectedOccurrence, key: &IdentityKey) -> bool {
    occ.slot_key.as_deref().map(str::trim).filter(|s| !s.is_empty()) == key.slot_key.as_deref()
}

/// Materializes the rows for `date`.
///
/// Template rows (matched or synthesized) come first in time-label order,
/// followed by every unmatched override for the date in persisted order.
/// Overrides for other dates are ignored. The output is a pure function of
/// the inputs, so re-deriving after a save never duplicates rows.
pub fn merge<P, F>(
    expected: &[ExpectedOccurrence],
    date: CalendarDate,
    persisted: &[OverrideRecord<P>],
    policy: MatchPolicy,
    default_payload: F,
) -> Result<Vec<MaterializedRow<P>>, EngineError>
where
    P: Payload,
    F: Fn(&ExpectedOccurrence) -> P,
{
    let day: Vec<(IdentityKey, &OverrideRecord<P>)> = persisted
        .iter()
        .filter(|r| r.date == date)
        .map(|r| (r.key(), r))
        .collect();

    let mut seen: HashSet<&IdentityKey> = HashSet::with_capacity(day.len());
    for (key, _) in &day {
        if !seen.insert(key) {
            return Err(EngineError::IdentityConflict {
                key: key.clone(),
                message: "persisted overrides repeat the same key".to_string(),
            });
        }
    }

    let mut used = vec![false; day.len()];
    let mut assigned: Vec<Option<usize>> = vec![None; expected.len()];

    // Exact identity matches first so name-only fallback cannot steal an
    // override that belongs to a later slot.
    for (oi, occ) in expected.iter().enumerate() {
        let entity = occ.entity_id.trim();
        let hit = day.iter().enumerate().position(|(i, (key, _))| {
            !used[i] && key.entity_id == entity && same_slot(occ, key)
        });
        if let Some(i) = hit {
            used[i] = true;
            assigned[oi] = Some(i);
        }
    }
    if policy == MatchPolicy::BySubjectName {
        for (oi, occ) in expected.iter().enumerate() {
            if assigned[oi].is_some() {
                continue;
            }
            let entity = occ.entity_id.trim();
            let hit = day
                .iter()
                .enumerate()
                .position(|(i, (key, _))| !used[i] && key.entity_id == entity);
            if let Some(i) = hit {
                used[i] = true;
                assigned[oi] = Some(i);
            }
        }
    }

    let mut rows: Vec<MaterializedRow<P>> = expected
        .iter()
        .zip(assigned)
        .map(|(occ, hit)| match hit {
            Some(i) => {
                let (key, record) = &day[i];
                MaterializedRow {
                    key: key.clone(),
                    origin: RowOrigin::FromOverride,
                    time_label: Some(occ.time_label.clone()),
                    removed: false,
                    payload: record.payload.clone(),
                }
            }
            None => MaterializedRow {
                key: IdentityKey::new(occ.entity_id.clone(), date, occ.slot_key.clone()),
                origin: RowOrigin::SynthesizedFromTemplate,
                time_label: Some(occ.time_label.clone()),
                removed: false,
                payload: default_payload(occ),
            },
        })
        .collect();
    rows.sort_by(|a, b| a.time_label.cmp(&b.time_label));

    rows.extend(
        day.iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|((key, record), _)| MaterializedRow {
                key: key.clone(),
                origin: RowOrigin::ManuallyAdded,
                time_label: None,
                removed: false,
                payload: record.payload.clone(),
            }),
    );

    let mut keys: HashSet<&IdentityKey> = HashSet::with_capacity(rows.len());
    for row in &rows {
        if !keys.insert(&row.key) {
            return Err(EngineError::IdentityConflict {
                key: row.key.clone(),
                message: "two materialized rows share one key".to_string(),
            });
        }
    }

    tracing::debug!(
        %date,
        expected = expected.len(),
        overrides = day.len(),
        rows = rows.len(),
        policy = policy.as_str(),
        "merged template with overrides"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::RecurringSlot;
    use crate::engine::payload::JournalPayload;
    use crate::engine::template::expand;

    fn d(raw: &str) -> CalendarDate {
        CalendarDate::parse(raw).expect("date")
    }

    fn slot(id: &str, weekday: u8, time: &str, subject: &str) -> RecurringSlot {
        RecurringSlot {
            id: id.to_string(),
            weekday,
            time_label: time.to_string(),
            subject_or_category: subject.to_string(),
        }
    }

    fn journal(subject: &str, slot: &str, date: &str, topic: &str) -> OverrideRecord<JournalPayload> {
        let mut payload = JournalPayload::for_subject(subject);
        payload.topic = topic.to_string();
        OverrideRecord {
            entity_id: subject.to_string(),
            date: d(date),
            slot_key: Some(slot.to_string()),
            payload,
        }
    }

    fn default_journal(occ: &ExpectedOccurrence) -> JournalPayload {
        JournalPayload::for_subject(occ.subject_or_category.clone())
    }

    #[test]
    fn single_monday_slot_synthesizes_one_row() {
        let template = vec![slot("s1", 1, "08:00", "Math")];
        let date = d("2025-01-06");
        let expected = expand(&template, date).expect("expand");
        let rows = merge(&expected, date, &[], MatchPolicy::BySlotKey, default_journal)
            .expect("merge");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].origin, RowOrigin::SynthesizedFromTemplate);
        assert_eq!(rows[0].payload.subject, "Math");
        assert_eq!(rows[0].key.entity_id, "Math");
        assert_eq!(rows[0].key.date, "2025-01-06");
    }

    #[test]
    fn merge_is_idempotent() {
        let template = vec![
            slot("s1", 1, "08:00", "Math"),
            slot("s2", 1, "09:30", "Science"),
            slot("s3", 1, "11:00", "Math"),
        ];
        let date = d("2025-01-06");
        let overrides = vec![
            journal("Math", "s3", "2025-01-06", "Fractions"),
            journal("History", "old", "2025-01-06", "Majapahit"),
            journal("Math", "s1", "2025-01-13", "next week"),
        ];
        let expected = expand(&template, date).expect("expand");
        let first = merge(&expected, date, &overrides, MatchPolicy::BySubjectName, default_journal)
            .expect("first");
        let second = merge(&expected, date, &overrides, MatchPolicy::BySubjectName, default_journal)
            .expect("second");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).expect("json"),
            serde_json::to_string(&second).expect("json")
        );
    }

    #[test]
    fn unmatched_overrides_are_kept_as_manually_added() {
        let template = vec![slot("s1", 1, "08:00", "Math")];
        let date = d("2025-01-06");
        let overrides = vec![
            journal("Civics", "x1", "2025-01-06", "Pancasila"),
            journal("Math", "s1", "2025-01-06", "Fractions"),
            journal("Drama", "x2", "2025-01-06", "Rehearsal"),
        ];
        let expected = expand(&template, date).expect("expand");
        let rows = merge(&expected, date, &overrides, MatchPolicy::BySlotKey, default_journal)
            .expect("merge");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].origin, RowOrigin::FromOverride);
        assert_eq!(rows[0].payload.topic, "Fractions");
        assert_eq!(rows[1].origin, RowOrigin::ManuallyAdded);
        assert_eq!(rows[1].key.entity_id, "Civics");
        assert_eq!(rows[2].key.entity_id, "Drama");
        assert_eq!(rows[2].time_label, None);
    }

    #[test]
    fn subject_name_policy_tolerates_new_slot_ids() {
        let template = vec![slot("new-1", 1, "08:00", "Math")];
        let date = d("2025-01-06");
        let overrides = vec![journal("Math", "old-1", "2025-01-06", "Fractions")];
        let expected = expand(&template, date).expect("expand");

        let by_name = merge(&expected, date, &overrides, MatchPolicy::BySubjectName, default_journal)
            .expect("by name");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].origin, RowOrigin::FromOverride);
        assert_eq!(by_name[0].key.slot_key.as_deref(), Some("old-1"));

        let by_slot = merge(&expected, date, &overrides, MatchPolicy::BySlotKey, default_journal)
            .expect("by slot");
        assert_eq!(by_slot.len(), 2);
        assert_eq!(by_slot[0].origin, RowOrigin::SynthesizedFromTemplate);
        assert_eq!(by_slot[1].origin, RowOrigin::ManuallyAdded);
    }

    #[test]
    fn exact_slot_match_wins_before_name_fallback() {
        let template = vec![slot("s1", 1, "08:00", "Math"), slot("s2", 1, "10:00", "Math")];
        let date = d("2025-01-06");
        let overrides = vec![journal("Math", "s2", "2025-01-06", "Decimals")];
        let expected = expand(&template, date).expect("expand");
        let rows = merge(&expected, date, &overrides, MatchPolicy::BySubjectName, default_journal)
            .expect("merge");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].origin, RowOrigin::SynthesizedFromTemplate);
        assert_eq!(rows[0].key.slot_key.as_deref(), Some("s1"));
        assert_eq!(rows[1].origin, RowOrigin::FromOverride);
        assert_eq!(rows[1].payload.topic, "Decimals");
    }

    #[test]
    fn repeated_persisted_keys_are_a_conflict() {
        let date = d("2025-01-06");
        let overrides = vec![
            journal("Math", "s1", "2025-01-06", "a"),
            journal("Math", "s1", "2025-01-06", "b"),
        ];
        let e = merge(&[], date, &overrides, MatchPolicy::BySlotKey, default_journal)
            .expect_err("conflict");
        assert!(matches!(e, EngineError::IdentityConflict { .. }));
    }
}
