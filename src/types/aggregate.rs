//! Aggregate value objects derived from readings

use chrono::{Datelike, Duration, Month, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::{AirQualityStatus, AirtrackError, Result};

/// One row per (location, calendar date, metric)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyAggregate {
    pub location: String,
    pub date: NaiveDate,
    pub metric: String,
    /// Mean over non-null samples; `None` when every sample was null
    pub mean: Option<f64>,
}

/// Reduction applied within a monthly bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Mean,
    #[default]
    Max,
    Sum,
}

impl Reducer {
    /// Reduce finite values. Empty input yields `None`.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Self::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Self::Max => values.iter().copied().reduce(f64::max),
            Self::Sum => Some(values.iter().sum()),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Max => "max",
            Self::Sum => "sum",
        }
    }
}

impl FromStr for Reducer {
    type Err = AirtrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(Self::Mean),
            "max" | "maximum" => Ok(Self::Max),
            "sum" | "total" => Ok(Self::Sum),
            other => Err(AirtrackError::Config(format!(
                "unknown reducer '{}': expected mean, max or sum",
                other
            ))),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row per (location, month, metric)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyAggregate {
    pub location: String,
    #[serde(serialize_with = "serialize_month")]
    pub month: Month,
    pub metric: String,
    pub reducer: Reducer,
    pub value: Option<f64>,
}

/// Total across several metrics for one (location, month)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyTotal {
    pub location: String,
    #[serde(serialize_with = "serialize_month")]
    pub month: Month,
    pub total: f64,
}

fn serialize_month<S: serde::Serializer>(
    month: &Month,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(month.name())
}

/// Mean of the daily means over one (location, month) window
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PeriodSummary {
    pub location: String,
    #[serde(serialize_with = "serialize_month")]
    pub month: Month,
    /// Calendar days with at least one reading
    pub day_count: usize,
    pub means: BTreeMap<String, Option<f64>>,
    pub status: Option<AirQualityStatus>,
}

impl PeriodSummary {
    pub fn mean(&self, metric: &str) -> Option<f64> {
        self.means.get(metric).copied().flatten()
    }
}

/// Mean of one metric over every reading of a location
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationMean {
    pub location: String,
    pub metric: String,
    pub mean: Option<f64>,
    /// Non-null samples that went into the mean
    pub samples: usize,
}

/// Weekday rows in canonical order
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Day-of-week × Monday-anchored week grid for one (location, metric).
///
/// Rows are Monday..Sunday, columns are week anchors in ascending order.
/// `cells[row][col]` holds the daily mean for `week_anchors[col] + row` days.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeeklyPivotGrid {
    pub location: String,
    pub metric: String,
    pub week_anchors: Vec<NaiveDate>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl WeeklyPivotGrid {
    pub fn week_count(&self) -> usize {
        self.week_anchors.len()
    }

    /// Calendar date of the cell at (`row`, `col`)
    pub fn date_at(&self, row: usize, col: usize) -> Option<NaiveDate> {
        if row >= WEEKDAYS.len() {
            return None;
        }
        self.week_anchors
            .get(col)
            .map(|anchor| *anchor + Duration::days(row as i64))
    }

    pub fn cell(&self, weekday: Weekday, anchor: NaiveDate) -> Option<f64> {
        let row = weekday.num_days_from_monday() as usize;
        let col = self.week_anchors.binary_search(&anchor).ok()?;
        self.cells.get(row)?.get(col).copied().flatten()
    }

    /// (row, col) position holding `date`, if it lies inside the grid
    pub fn position_of(&self, date: NaiveDate) -> Option<(usize, usize)> {
        let row = date.weekday().num_days_from_monday() as usize;
        let anchor = date - Duration::days(row as i64);
        let col = self.week_anchors.binary_search(&anchor).ok()?;
        Some((row, col))
    }

    pub fn cell_for_date(&self, date: NaiveDate) -> Option<f64> {
        let (row, col) = self.position_of(date)?;
        self.cells.get(row)?.get(col).copied().flatten()
    }
}
