use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::date::CalendarDate;
use super::error::EngineError;
use super::merge::{merge, MatchPolicy};
use super::model::{IdentityKey, MaterializedRow, OverrideRecord, RowOrigin};
use super::payload::Payload;
use super::plan::{plan, UpsertPlan};
use super::propagate::{propagate, propagate_by_payload_group};
use super::template::ExpectedOccurrence;

/// The editable row set for one date, carried by the caller between steps.
///
/// Every operation returns a new session; the receiver is left as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationSession<P> {
    date: CalendarDate,
    policy: MatchPolicy,
    rows: Vec<MaterializedRow<P>>,
}

impl<P: Payload> ReconciliationSession<P> {
    pub fn open<F>(
        expected: &[ExpectedOccurrence],
        date: CalendarDate,
        persisted: &[OverrideRecord<P>],
        policy: MatchPolicy,
        default_payload: F,
    ) -> Result<Self, EngineError>
    where
        F: Fn(&ExpectedOccurrence) -> P,
    {
        let rows = merge(expected, date, persisted, policy, default_payload)?;
        Ok(Self { date, policy, rows })
    }

    /// Rebuilds a session from rows a client sent back.
    pub fn from_rows(date: CalendarDate, policy: MatchPolicy, rows: Vec<MaterializedRow<P>>) -> Self {
        Self { date, policy, rows }
    }

    pub fn date(&self) -> CalendarDate {
        self.date
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn rows(&self) -> &[MaterializedRow<P>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<MaterializedRow<P>> {
        self.rows
    }

    fn with_rows(&self, rows: Vec<MaterializedRow<P>>) -> Self {
        Self {
            date: self.date,
            policy: self.policy,
            rows,
        }
    }

    /// Edits one field, mirrored across the row's payload group.
    pub fn edit(&self, index: usize, field: &str, value: &JsonValue) -> Result<Self, EngineError> {
        let rows = propagate_by_payload_group(&self.rows, index, field, value)?;
        Ok(self.with_rows(rows))
    }

    pub fn edit_with<G>(
        &self,
        index: usize,
        field: &str,
        value: &JsonValue,
        group_key: G,
    ) -> Result<Self, EngineError>
    where
        G: Fn(&MaterializedRow<P>) -> Option<String>,
    {
        let rows = propagate(&self.rows, index, field, value, group_key)?;
        Ok(self.with_rows(rows))
    }

    /// Appends an extra row on the session date.
    pub fn add_manual_row(
        &self,
        entity_id: &str,
        slot_key: Option<String>,
        payload: P,
    ) -> Result<Self, EngineError> {
        let key = IdentityKey::new(entity_id, self.date, slot_key);
        if key.entity_id.is_empty() {
            return Err(EngineError::invalid_value("entityId", "must not be empty"));
        }
        if self.rows.iter().any(|r| r.key.normalized() == key) {
            return Err(EngineError::IdentityConflict {
                key,
                message: "row already present in this session".to_string(),
            });
        }
        let mut rows = self.rows.clone();
        rows.push(MaterializedRow {
            key,
            origin: RowOrigin::ManuallyAdded,
            time_label: None,
            removed: false,
            payload,
        });
        Ok(self.with_rows(rows))
    }

    pub fn mark_removed(&self, index: usize) -> Result<Self, EngineError> {
        if index >= self.rows.len() {
            return Err(EngineError::RowIndexOutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        let mut rows = self.rows.clone();
        rows[index].removed = true;
        Ok(self.with_rows(rows))
    }

    pub fn plan(&self, snapshot: &[OverrideRecord<P>]) -> UpsertPlan<P> {
        plan(&self.rows, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::RecurringSlot;
    use crate::engine::payload::JournalPayload;
    use crate::engine::template::expand;
    use serde_json::json;

    fn slot(id: &str, time: &str, subject: &str) -> RecurringSlot {
        RecurringSlot {
            id: id.to_string(),
            weekday: 1,
            time_label: time.to_string(),
            subject_or_category: subject.to_string(),
        }
    }

    fn open_monday() -> ReconciliationSession<JournalPayload> {
        let template = vec![
            slot("s1", "08:00", "Math"),
            slot("s2", "09:30", "Math"),
            slot("s3", "11:00", "Science"),
        ];
        let date = CalendarDate::parse("2025-01-06").expect("date");
        let expected = expand(&template, date).expect("expand");
        ReconciliationSession::open(&expected, date, &[], MatchPolicy::BySubjectName, |occ| {
            JournalPayload::for_subject(occ.subject_or_category.clone())
        })
        .expect("open")
    }

    #[test]
    fn topic_edit_on_math_reaches_both_math_rows_only() {
        let session = open_monday();
        let edited = session.edit(0, "topic", &json!("Fractions")).expect("edit");
        let topics: Vec<&str> = edited.rows().iter().map(|r| r.payload.topic.as_str()).collect();
        assert_eq!(topics, vec!["Fractions", "Fractions", ""]);
        assert_eq!(edited.rows()[2], session.rows()[2]);
        // The receiver is left untouched.
        assert!(session.rows().iter().all(|r| r.payload.topic.is_empty()));
    }

    #[test]
    fn edit_then_plan_writes_only_touched_rows() {
        let session = open_monday()
            .edit(2, "topic", &json!("Plants"))
            .expect("edit");
        let out = session.plan(&[]);
        assert_eq!(out.to_upsert.len(), 1);
        assert_eq!(out.to_upsert[0].entity_id, "Science");
        assert_eq!(out.to_upsert[0].slot_key.as_deref(), Some("s3"));
    }

    #[test]
    fn manual_rows_are_unique_and_removable() {
        let session = open_monday();
        let with_extra = session
            .add_manual_row("Civics", Some("extra".into()), JournalPayload::for_subject("Civics"))
            .expect("add");
        assert_eq!(with_extra.rows().len(), 4);
        assert_eq!(with_extra.rows()[3].origin, RowOrigin::ManuallyAdded);
        assert!(with_extra
            .add_manual_row("Civics", Some("extra".into()), JournalPayload::default())
            .is_err());

        let removed = with_extra.mark_removed(3).expect("remove");
        assert!(removed.rows()[3].removed);
        assert!(removed.plan(&[]).is_empty());
        assert!(removed.mark_removed(10).is_err());
    }
}
