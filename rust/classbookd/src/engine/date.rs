use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::error::EngineError;

const ISO_FORMAT: &str = "%Y-%m-%d";

/// A calendar day, always rendered as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let trimmed = raw.trim();
        // chrono accepts unpadded fields; the stored form is always padded.
        if trimmed.len() != 10 {
            return Err(EngineError::UnparseableDate(raw.to_string()));
        }
        NaiveDate::parse_from_str(trimmed, ISO_FORMAT)
            .map(Self)
            .map_err(|_| EngineError::UnparseableDate(raw.to_string()))
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// 0 = Sunday .. 6 = Saturday.
    pub fn weekday(self) -> u8 {
        self.0.weekday().num_days_from_sunday() as u8
    }

    pub fn succ(self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }

    /// Every day in `[self, end]`; empty when `end` precedes `self`.
    pub fn days_through(self, end: CalendarDate) -> DateRange {
        DateRange {
            next: if self <= end { Some(self) } else { None },
            end,
        }
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(ISO_FORMAT))
    }
}

impl FromStr for CalendarDate {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CalendarDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct DateRange {
    next: Option<CalendarDate>,
    end: CalendarDate,
}

impl Iterator for DateRange {
    type Item = CalendarDate;

    fn next(&mut self) -> Option<CalendarDate> {
        let current = self.next?;
        self.next = if current < self.end {
            current.succ()
        } else {
            None
        };
        Some(current)
    }
}
