use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::calendar::CalendarIndex;
use super::date::CalendarDate;
use super::error::Warning;
use super::model::{AggregateResult, OverrideRecord};
use super::payload::{AttendancePayload, AttendanceStatus, GradeComponentPayload};

/// Percentage with a zero denominator mapped to 0.
pub fn percentage(count: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        100.0 * f64::from(count) / f64::from(denominator)
    }
}

/// One-decimal rounding for display.
pub fn round_1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Attendance recap

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub present_count: u32,
    pub dispensation_count: u32,
    pub sick_count: u32,
    pub permit_count: u32,
    pub absent_count: u32,
}

impl AttendanceCounts {
    /// Days on which attendance was satisfied (present or dispensation).
    pub fn satisfied_count(&self) -> u32 {
        self.present_count + self.dispensation_count
    }

    fn add(&mut self, other: &AttendanceCounts) {
        self.present_count += other.present_count;
        self.dispensation_count += other.dispensation_count;
        self.sick_count += other.sick_count;
        self.permit_count += other.permit_count;
        self.absent_count += other.absent_count;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAttendance {
    pub entity_id: String,
    #[serde(flatten)]
    pub counts: AttendanceCounts,
    pub effective_day_count: u32,
}

/// Classroom-wide percentages: counter / (entities x effective days).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomRates {
    pub presence: f64,
    pub sick: f64,
    pub permit: f64,
    pub absent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecap {
    pub start: CalendarDate,
    pub end: CalendarDate,
    pub effective_day_count: u32,
    pub entities: Vec<EntityAttendance>,
    pub warnings: Vec<Warning>,
}

impl AttendanceRecap {
    pub fn get(&self, entity_id: &str) -> Option<&EntityAttendance> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }

    /// Per-entity presence percentage over the effective days.
    pub fn presence_rate(&self, entity_id: &str) -> Option<f64> {
        self.get(entity_id)
            .map(|e| percentage(e.counts.satisfied_count(), self.effective_day_count))
    }

    pub fn totals(&self) -> AttendanceCounts {
        let mut total = AttendanceCounts::default();
        for e in &self.entities {
            total.add(&e.counts);
        }
        total
    }

    pub fn classroom_rates(&self) -> ClassroomRates {
        let denominator = (self.entities.len() as u32).saturating_mul(self.effective_day_count);
        let total = self.totals();
        ClassroomRates {
            presence: percentage(total.satisfied_count(), denominator),
            sick: percentage(total.sick_count, denominator),
            permit: percentage(total.permit_count, denominator),
            absent: percentage(total.absent_count, denominator),
        }
    }

    pub fn to_results(&self) -> BTreeMap<String, AggregateResult> {
        self.entities
            .iter()
            .map(|e| {
                let days = self.effective_day_count;
                let mut metrics = BTreeMap::new();
                metrics.insert("presentCount".to_string(), f64::from(e.counts.present_count));
                metrics.insert(
                    "dispensationCount".to_string(),
                    f64::from(e.counts.dispensation_count),
                );
                metrics.insert("sickCount".to_string(), f64::from(e.counts.sick_count));
                metrics.insert("permitCount".to_string(), f64::from(e.counts.permit_count));
                metrics.insert("absentCount".to_string(), f64::from(e.counts.absent_count));
                metrics.insert("effectiveDayCount".to_string(), f64::from(days));
                metrics.insert(
                    "presenceRate".to_string(),
                    percentage(e.counts.satisfied_count(), days),
                );
                (
                    e.entity_id.clone(),
                    AggregateResult {
                        entity_id: e.entity_id.clone(),
                        metrics,
                        rank: None,
                    },
                )
            })
            .collect()
    }
}

/// Counts attendance marks for `entities` over `[start, end]`.
///
/// The effective-day denominator is computed once for the whole class.
/// Presence (present/dispensation) only counts on instructional days, since
/// it is the numerator of that denominator. Sick, permit and absent marks
/// count on any day in range, excluded or not. Only whole-day marks (no slot
/// key) count; per-lesson marks are ignored. A student's first whole-day mark
/// per date wins; marks for students outside `entities` are ignored.
pub fn compute_attendance_stats(
    entities: &[String],
    start: CalendarDate,
    end: CalendarDate,
    overrides: &[OverrideRecord<AttendancePayload>],
    calendar: &CalendarIndex,
) -> AttendanceRecap {
    let effective_day_count = calendar.effective_day_count(start, end);
    let mut warnings = calendar.warnings().to_vec();

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(entities.len());
    let mut rows: Vec<EntityAttendance> = Vec::with_capacity(entities.len());
    for id in entities {
        if index.contains_key(id.as_str()) {
            continue;
        }
        index.insert(id.as_str(), rows.len());
        rows.push(EntityAttendance {
            entity_id: id.clone(),
            counts: AttendanceCounts::default(),
            effective_day_count,
        });
    }

    let mut counted: HashSet<(&str, CalendarDate)> = HashSet::new();
    for record in overrides {
        if record.date < start || record.date > end {
            continue;
        }
        let Some(&slot) = index.get(record.entity_id.trim()) else {
            continue;
        };
        if record.slot_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
            continue;
        }
        let Some(status) = record.payload.status else {
            continue;
        };
        if !counted.insert((record.entity_id.trim(), record.date)) {
            warnings.push(Warning::validation(
                format!(
                    "second attendance mark for {} on {} ignored",
                    record.entity_id, record.date
                ),
                Some(record.key()),
            ));
            continue;
        }
        let excluded = calendar.is_excluded(record.date);
        let counts = &mut rows[slot].counts;
        match status {
            AttendanceStatus::Present if !excluded => counts.present_count += 1,
            AttendanceStatus::Dispensation if !excluded => counts.dispensation_count += 1,
            AttendanceStatus::Present | AttendanceStatus::Dispensation => {}
            AttendanceStatus::Sick => counts.sick_count += 1,
            AttendanceStatus::Permit => counts.permit_count += 1,
            AttendanceStatus::Absent => counts.absent_count += 1,
        }
    }

    AttendanceRecap {
        start,
        end,
        effective_day_count,
        entities: rows,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Ranking

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectScores {
    pub subject: String,
    pub components: Vec<Option<f64>>,
}

/// Rounded mean of the components that carry a positive score; 0 when none do.
pub fn subject_final_score(components: &[Option<f64>]) -> i64 {
    let scored: Vec<f64> = components
        .iter()
        .filter_map(|c| *c)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if scored.is_empty() {
        return 0;
    }
    let mean = scored.iter().sum::<f64>() / scored.len() as f64;
    mean.round() as i64
}

/// Numeric position, or `-` for students with nothing recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    Position(u32),
    Unranked,
}

impl Serialize for Rank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Rank::Position(n) => serializer.serialize_u32(*n),
            Rank::Unranked => serializer.serialize_str("-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    pub entity_id: String,
    pub total_score: i64,
    pub scored_subject_count: u32,
    pub average_score: f64,
    pub rank: Rank,
}

impl RankEntry {
    pub fn to_result(&self) -> AggregateResult {
        let mut metrics = BTreeMap::new();
        metrics.insert("totalScore".to_string(), self.total_score as f64);
        metrics.insert("averageScore".to_string(), self.average_score);
        metrics.insert(
            "scoredSubjectCount".to_string(),
            f64::from(self.scored_subject_count),
        );
        AggregateResult {
            entity_id: self.entity_id.clone(),
            metrics,
            rank: Some(self.rank),
        }
    }
}

/// Ranks `entities` by the sum of their subject final scores.
///
/// Ranking is strictly sequential in sorted order; equal totals keep the
/// order of `entities`. A total of 0 means nothing was recorded and gets no
/// numeric rank. Identical input always yields identical output.
pub fn compute_ranks(
    entities: &[String],
    scores: &HashMap<String, Vec<SubjectScores>>,
) -> Vec<RankEntry> {
    let mut entries: Vec<RankEntry> = entities
        .iter()
        .map(|id| {
            let finals: Vec<i64> = scores
                .get(id)
                .map(|subjects| {
                    subjects
                        .iter()
                        .map(|s| subject_final_score(&s.components))
                        .collect()
                })
                .unwrap_or_default();
            let total_score: i64 = finals.iter().sum();
            let scored_subject_count = finals.iter().filter(|v| **v > 0).count() as u32;
            let average_score = if scored_subject_count > 0 {
                round_1(total_score as f64 / f64::from(scored_subject_count))
            } else {
                0.0
            };
            RankEntry {
                entity_id: id.clone(),
                total_score,
                scored_subject_count,
                average_score,
                rank: Rank::Unranked,
            }
        })
        .collect();

    entries.sort_by(|a, b| b.total_score.cmp(&a.total_score));

    let mut next = 1u32;
    for entry in &mut entries {
        if entry.total_score != 0 {
            entry.rank = Rank::Position(next);
            next += 1;
        }
    }
    entries
}

/// Groups grade records per student and subject. Subjects come out sorted by
/// name and components by component name so the grouping is deterministic.
pub fn subject_scores_from_grades(
    records: &[OverrideRecord<GradeComponentPayload>],
) -> HashMap<String, Vec<SubjectScores>> {
    let mut grouped: HashMap<String, BTreeMap<String, BTreeMap<(String, String), Option<f64>>>> =
        HashMap::new();
    for record in records {
        let subject = record.payload.subject.trim().to_string();
        let component = record.payload.component.trim().to_string();
        grouped
            .entry(record.entity_id.trim().to_string())
            .or_default()
            .entry(subject)
            .or_default()
            .insert((component, record.date.to_string()), record.payload.score);
    }
    grouped
        .into_iter()
        .map(|(entity, subjects)| {
            let list = subjects
                .into_iter()
                .map(|(subject, components)| SubjectScores {
                    subject,
                    components: components.into_values().collect(),
                })
                .collect();
            (entity, list)
        })
        .collect()
}
