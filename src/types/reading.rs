//! Sensor reading types

use chrono::{DateTime, FixedOffset, Month, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::{AirtrackError, Result};

/// A single timestamped observation for one location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub location: String,
    pub timestamp: DateTime<Utc>,
    /// Metric name → value. `None` marks a missing or non-numeric sample.
    pub metrics: BTreeMap<String, Option<f64>>,
}

impl Reading {
    pub fn new(location: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            location: location.into(),
            timestamp,
            metrics: BTreeMap::new(),
        }
    }

    /// Builder-style metric insertion
    pub fn with_metric(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Numeric value for `metric`. NaN and infinities count as missing.
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.metrics
            .get(metric)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }

    /// Whether the metric column exists on this reading (even if null)
    pub fn has_metric(&self, metric: &str) -> bool {
        self.metrics.contains_key(metric)
    }
}

/// The single time reference used to truncate instants to calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeReference {
    #[default]
    Utc,
    Fixed(FixedOffset),
}

impl TimeReference {
    /// Calendar date of `ts` in this reference
    pub fn date_of(&self, ts: &DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Utc => ts.date_naive(),
            Self::Fixed(offset) => ts.with_timezone(offset).date_naive(),
        }
    }

    /// Calendar month of `ts` in this reference
    pub fn month_of(&self, ts: &DateTime<Utc>) -> Month {
        use chrono::Datelike;
        let month = self.date_of(ts).month();
        // month() is always 1..=12
        Month::try_from(month as u8).unwrap_or(Month::January)
    }

    /// Interpret a wall-clock timestamp as local time in this reference
    pub fn localize(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Self::Utc => naive.and_utc(),
            Self::Fixed(offset) => match offset.from_local_datetime(&naive) {
                chrono::LocalResult::Single(dt) => dt.to_utc(),
                chrono::LocalResult::Ambiguous(earlier, _) => earlier.to_utc(),
                // Fixed offsets have no gaps
                chrono::LocalResult::None => naive.and_utc(),
            },
        }
    }
}

impl FromStr for TimeReference {
    type Err = AirtrackError;

    /// Accepts `"utc"`/`"z"` or a fixed offset such as `"+05:30"` / `"-0800"`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
            return Ok(Self::Utc);
        }

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => {
                return Err(AirtrackError::Config(format!(
                    "invalid time reference '{}': expected 'utc' or an offset like +05:30",
                    s
                )))
            }
        };

        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AirtrackError::Config(format!(
                "invalid time reference '{}': expected 'utc' or an offset like +05:30",
                s
            )));
        }
        let hours: i32 = digits[..2].parse().unwrap_or(0);
        let minutes: i32 = digits[2..].parse().unwrap_or(0);
        if minutes > 59 {
            return Err(AirtrackError::Config(format!(
                "invalid time reference '{}': minutes must be below 60",
                s
            )));
        }
        let seconds = sign * (hours * 3600 + minutes * 60);

        FixedOffset::east_opt(seconds)
            .map(Self::Fixed)
            .ok_or_else(|| AirtrackError::Config(format!("offset out of range: '{}'", s)))
    }
}

impl fmt::Display for TimeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utc => write!(f, "utc"),
            Self::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(AirtrackError::Config(format!(
                "date range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
