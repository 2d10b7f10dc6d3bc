use serde::{Serialize, Serializer};
use std::collections::HashMap;

use super::date::CalendarDate;
use super::error::Warning;
use super::model::{HolidayCategory, HolidayEntry};

pub const SUNDAY: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    Holiday(HolidayCategory),
    Weekend,
}

impl ExclusionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExclusionReason::Holiday(category) => category.as_str(),
            ExclusionReason::Weekend => "weekend",
        }
    }
}

impl Serialize for ExclusionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ExclusionReason>,
}

impl Classification {
    const INSTRUCTIONAL: Classification = Classification {
        excluded: false,
        reason: None,
    };

    fn excluded(reason: ExclusionReason) -> Self {
        Self {
            excluded: true,
            reason: Some(reason),
        }
    }
}

/// Holiday lookup keyed by date, plus the set of weekdays that never count as
/// school days. Built once per request and shared by every stage that needs
/// to know whether a day is instructional.
#[derive(Debug, Clone)]
pub struct CalendarIndex {
    holidays: HashMap<CalendarDate, HolidayCategory>,
    weekend: [bool; 7],
    warnings: Vec<Warning>,
}

impl Default for CalendarIndex {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl CalendarIndex {
    /// First entry per date wins; entries with malformed dates never match.
    pub fn new(holidays: &[HolidayEntry]) -> Self {
        let mut by_date = HashMap::with_capacity(holidays.len());
        let mut warnings = Vec::new();
        for entry in holidays {
            match CalendarDate::parse(&entry.date) {
                Ok(date) => {
                    by_date.entry(date).or_insert(entry.category);
                }
                Err(_) => {
                    tracing::warn!(
                        holiday_id = %entry.id,
                        date = %entry.date,
                        "skipping holiday with unparseable date"
                    );
                    warnings.push(Warning::calendar(format!(
                        "holiday {} has unparseable date {:?}",
                        entry.id, entry.date
                    )));
                }
            }
        }
        let mut weekend = [false; 7];
        weekend[SUNDAY as usize] = true;
        Self {
            holidays: by_date,
            weekend,
            warnings,
        }
    }

    /// Adds weekdays (0 = Sunday) to the weekend set. Sunday always stays.
    pub fn with_weekend_days(mut self, days: &[u8]) -> Self {
        for &day in days {
            if let Some(slot) = self.weekend.get_mut(day as usize) {
                *slot = true;
            }
        }
        self
    }

    pub fn weekend_days(&self) -> Vec<u8> {
        (0u8..7).filter(|d| self.weekend[*d as usize]).collect()
    }

    /// A holiday beats the weekend when both apply.
    pub fn classify(&self, date: CalendarDate) -> Classification {
        if let Some(category) = self.holidays.get(&date) {
            return Classification::excluded(ExclusionReason::Holiday(*category));
        }
        if self.weekend[date.weekday() as usize] {
            return Classification::excluded(ExclusionReason::Weekend);
        }
        Classification::INSTRUCTIONAL
    }

    pub fn is_excluded(&self, date: CalendarDate) -> bool {
        self.classify(date).excluded
    }

    pub fn classify_range(
        &self,
        start: CalendarDate,
        end: CalendarDate,
    ) -> Vec<(CalendarDate, Classification)> {
        start
            .days_through(end)
            .map(|d| (d, self.classify(d)))
            .collect()
    }

    /// Number of instructional days in `[start, end]`.
    pub fn effective_day_count(&self, start: CalendarDate, end: CalendarDate) -> u32 {
        start
            .days_through(end)
            .filter(|d| !self.is_excluded(*d))
            .count() as u32
    }

    /// Holiday entries that were skipped while building the index.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// One-shot classification against an unindexed holiday list.
pub fn classify(date: CalendarDate, holidays: &[HolidayEntry]) -> Classification {
    CalendarIndex::new(holidays).classify(date)
}
