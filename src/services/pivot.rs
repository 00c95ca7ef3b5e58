//! Day-of-week × week pivot over daily aggregates

use crate::types::{AirtrackError, DailyAggregate, Reducer, Result, WeeklyPivotGrid, WEEKDAYS};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

/// Monday of the week containing `date`
pub fn week_anchor(date: NaiveDate) -> NaiveDate {
    let days_since_monday = date.weekday().num_days_from_monday();
    date - Duration::days(days_since_monday as i64)
}

/// Build a 7×N grid (rows = Mon..Sun, cols = weeks) for one metric of one location.
///
/// Week anchors run gap-free from the Monday on or before the earliest date to
/// the Monday of the latest date's week. Cells without a daily row, or whose
/// daily mean is null, are `None`.
pub fn build_weekly_pivot(daily: &[DailyAggregate], metric: &str) -> Result<WeeklyPivotGrid> {
    let rows: Vec<&DailyAggregate> = daily.iter().filter(|d| d.metric == metric).collect();
    if rows.is_empty() {
        return Err(AirtrackError::InvalidMetric(metric.to_string()));
    }

    let locations: BTreeSet<&str> = rows.iter().map(|d| d.location.as_str()).collect();
    if locations.len() > 1 {
        return Err(AirtrackError::MixedLocations {
            metric: metric.to_string(),
            locations: locations.into_iter().map(String::from).collect(),
        });
    }
    let location = rows[0].location.clone();

    // Several rows for one date only happen on merged inputs; average them
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for row in &rows {
        let values = by_date.entry(row.date).or_default();
        if let Some(mean) = row.mean {
            values.push(mean);
        }
    }

    // by_date is non-empty here
    let (Some(min_date), Some(max_date)) = (
        by_date.keys().next().copied(),
        by_date.keys().next_back().copied(),
    ) else {
        return Err(AirtrackError::NoData(metric.to_string()));
    };

    let first_monday = week_anchor(min_date);
    let last_monday = week_anchor(max_date);
    let week_count = ((last_monday - first_monday).num_days() / 7 + 1) as usize;

    let week_anchors: Vec<NaiveDate> = (0..week_count)
        .map(|i| first_monday + Duration::weeks(i as i64))
        .collect();

    let mut cells: Vec<Vec<Option<f64>>> = vec![vec![None; week_count]; WEEKDAYS.len()];
    for (date, values) in &by_date {
        let row = date.weekday().num_days_from_monday() as usize;
        let col = ((week_anchor(*date) - first_monday).num_days() / 7) as usize;
        cells[row][col] = Reducer::Mean.apply(values);
    }

    Ok(WeeklyPivotGrid {
        location,
        metric: metric.to_string(),
        week_anchors,
        cells,
    })
}

/// One grid per location present in `daily`, sorted by location
pub fn build_weekly_pivots(
    daily: &[DailyAggregate],
    metric: &str,
) -> Result<Vec<WeeklyPivotGrid>> {
    let mut by_location: BTreeMap<&str, Vec<DailyAggregate>> = BTreeMap::new();
    for row in daily.iter().filter(|d| d.metric == metric) {
        by_location
            .entry(row.location.as_str())
            .or_default()
            .push(row.clone());
    }

    if by_location.is_empty() {
        return Err(AirtrackError::InvalidMetric(metric.to_string()));
    }

    by_location
        .values()
        .map(|rows| build_weekly_pivot(rows, metric))
        .collect()
}
