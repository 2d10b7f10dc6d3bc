use serde_json::Value as JsonValue;

use super::error::EngineError;
use super::model::MaterializedRow;
use super::payload::Payload;

fn normalized_group(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

/// Applies `field = value` to the edited row and to every row of the same
/// propagation group, returning a new row set.
///
/// Rows with a blank group key only ever receive their own edits. Rows on a
/// different date never join the group. If any targeted row rejects the
/// value, nothing is applied. Only payloads change; row keys are untouched.
pub fn propagate<P, G>(
    rows: &[MaterializedRow<P>],
    edited_index: usize,
    field: &str,
    value: &JsonValue,
    group_key: G,
) -> Result<Vec<MaterializedRow<P>>, EngineError>
where
    P: Payload,
    G: Fn(&MaterializedRow<P>) -> Option<String>,
{
    let Some(edited) = rows.get(edited_index) else {
        return Err(EngineError::RowIndexOutOfRange {
            index: edited_index,
            len: rows.len(),
        });
    };
    let target = normalized_group(group_key(edited));
    let date = edited.key.date.as_str();

    let mut out = rows.to_vec();
    let mut touched = 0usize;
    for (i, row) in out.iter_mut().enumerate() {
        let joins = i == edited_index
            || match &target {
                Some(group) => {
                    rows[i].key.date == date
                        && normalized_group(group_key(&rows[i])).as_ref() == Some(group)
                }
                None => false,
            };
        if joins {
            row.payload.set_field(field, value)?;
            touched += 1;
        }
    }

    tracing::debug!(
        field,
        group = target.as_deref().unwrap_or(""),
        touched,
        "propagated field edit"
    );
    Ok(out)
}

/// [`propagate`] grouped by [`Payload::group_key`].
pub fn propagate_by_payload_group<P: Payload>(
    rows: &[MaterializedRow<P>],
    edited_index: usize,
    field: &str,
    value: &JsonValue,
) -> Result<Vec<MaterializedRow<P>>, EngineError> {
    propagate(rows, edited_index, field, value, |row| {
        row.payload.group_key().map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::date::CalendarDate;
    use crate::engine::model::{IdentityKey, RowOrigin};
    use crate::engine::payload::{AttendancePayload, JournalPayload};
    use serde_json::json;

    fn row(subject: &str, slot: &str, date: &str) -> MaterializedRow<JournalPayload> {
        MaterializedRow {
            key: IdentityKey::new(
                subject,
                CalendarDate::parse(date).expect("date"),
                Some(slot.to_string()),
            ),
            origin: RowOrigin::SynthesizedFromTemplate,
            time_label: Some("08:00".to_string()),
            removed: false,
            payload: JournalPayload::for_subject(subject),
        }
    }

    #[test]
    fn topic_edit_reaches_every_row_of_the_subject() {
        let rows = vec![
            row("Math", "s1", "2025-01-06"),
            row("Science", "s2", "2025-01-06"),
            row("Math", "s3", "2025-01-06"),
        ];
        let out = propagate_by_payload_group(&rows, 0, "topic", &json!("Fractions"))
            .expect("propagate");
        assert_eq!(out[0].payload.topic, "Fractions");
        assert_eq!(out[2].payload.topic, "Fractions");
        assert_eq!(out[0].payload.activities, "Math: Fractions");
        assert_eq!(out[2].payload.activities, "Math: Fractions");
        assert_eq!(out[1], rows[1]);
        // Input set is untouched.
        assert_eq!(rows[0].payload.topic, "");
    }

    #[test]
    fn blank_group_key_is_a_singleton() {
        let rows = vec![row("", "s1", "2025-01-06"), row("", "s2", "2025-01-06")];
        let out = propagate_by_payload_group(&rows, 1, "topic", &json!("Warm-up"))
            .expect("propagate");
        assert_eq!(out[1].payload.topic, "Warm-up");
        assert_eq!(out[0], rows[0]);
    }

    #[test]
    fn other_dates_never_join_the_group() {
        let rows = vec![row("Math", "s1", "2025-01-06"), row("Math", "s1", "2025-01-07")];
        let out = propagate_by_payload_group(&rows, 0, "method", &json!("lecture"))
            .expect("propagate");
        assert_eq!(out[0].payload.method, "lecture");
        assert_eq!(out[1], rows[1]);
    }

    #[test]
    fn attendance_edits_stay_on_one_student() {
        let date = CalendarDate::parse("2025-01-06").expect("date");
        let rows: Vec<MaterializedRow<AttendancePayload>> = ["s1", "s2"]
            .iter()
            .map(|id| MaterializedRow {
                key: IdentityKey::new(*id, date, None),
                origin: RowOrigin::SynthesizedFromTemplate,
                time_label: None,
                removed: false,
                payload: AttendancePayload::default(),
            })
            .collect();
        let out = propagate_by_payload_group(&rows, 0, "status", &json!("sick")).expect("edit");
        assert!(out[0].payload.status.is_some());
        assert_eq!(out[1], rows[1]);
    }

    #[test]
    fn rejected_value_leaves_nothing_applied() {
        let rows = vec![row("Math", "s1", "2025-01-06")];
        assert!(propagate_by_payload_group(&rows, 0, "topic", &json!(3)).is_err());
        assert!(matches!(
            propagate_by_payload_group(&rows, 5, "topic", &json!("x")),
            Err(EngineError::RowIndexOutOfRange { index: 5, len: 1 })
        ));
    }
}
