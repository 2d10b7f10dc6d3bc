use serde::Serialize;
use std::collections::HashMap;

use super::date::CalendarDate;
use super::error::Warning;
use super::model::{IdentityKey, MaterializedRow, OverrideRecord, RowOrigin};
use super::payload::Payload;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertPlan<P> {
    pub to_upsert: Vec<OverrideRecord<P>>,
    pub to_delete: Vec<IdentityKey>,
    pub warnings: Vec<Warning>,
}

impl<P> UpsertPlan<P> {
    pub fn is_empty(&self) -> bool {
        self.to_upsert.is_empty() && self.to_delete.is_empty()
    }
}

/// Reduces an edited row set to the writes the store actually needs.
///
/// - synthesized rows still equal to their template default are not persisted;
/// - rows equal to their persisted payload are skipped;
/// - removed rows become deletes only if they were persisted;
/// - rows with an unusable key are skipped with a warning;
/// - a key repeated in the batch keeps its last edit.
///
/// Neither input is modified.
pub fn plan<P: Payload>(
    edited: &[MaterializedRow<P>],
    snapshot: &[OverrideRecord<P>],
) -> UpsertPlan<P> {
    let persisted: HashMap<IdentityKey, &P> =
        snapshot.iter().map(|r| (r.key(), &r.payload)).collect();
    let mut warnings = Vec::new();

    let mut latest: Vec<(IdentityKey, CalendarDate, &MaterializedRow<P>)> =
        Vec::with_capacity(edited.len());
    let mut position: HashMap<IdentityKey, usize> = HashMap::with_capacity(edited.len());
    for row in edited {
        let key = row.key.normalized();
        let date = match key.validate() {
            Ok(date) => date,
            Err(reason) => {
                tracing::warn!(key = %key, reason = %reason, "skipping row with malformed key");
                warnings.push(Warning::validation(
                    format!("row skipped: {}", reason),
                    Some(row.key.clone()),
                ));
                continue;
            }
        };
        match position.get(&key).copied() {
            Some(i) => latest[i].2 = row,
            None => {
                position.insert(key.clone(), latest.len());
                latest.push((key, date, row));
            }
        }
    }

    let mut to_upsert = Vec::new();
    let mut to_delete = Vec::new();
    for (key, date, row) in latest {
        let previous = persisted.get(&key).copied();
        if row.removed {
            if previous.is_some() {
                to_delete.push(key);
            }
            continue;
        }

        let mut payload = row.payload.clone();
        if let Some(message) = payload.normalize() {
            warnings.push(Warning::validation(message, Some(key.clone())));
        }
        match previous {
            Some(prev) if *prev == payload => continue,
            None if row.origin == RowOrigin::SynthesizedFromTemplate
                && payload.is_default_for(&key) =>
            {
                continue
            }
            _ => {}
        }
        to_upsert.push(OverrideRecord {
            entity_id: key.entity_id,
            date,
            slot_key: key.slot_key,
            payload,
        });
    }

    tracing::debug!(
        rows = edited.len(),
        upserts = to_upsert.len(),
        deletes = to_delete.len(),
        warnings = warnings.len(),
        "planned batch upsert"
    );
    UpsertPlan {
        to_upsert,
        to_delete,
        warnings,
    }
}
