//! In-memory container for normalized readings

use crate::services::combiner::CombinedReadings;
use crate::types::{DateRange, Reading, TimeReference};
use std::collections::BTreeSet;

/// Immutable snapshot of readings, possibly spanning several locations
#[derive(Debug, Clone, Default)]
pub struct ReadingStore {
    readings: Vec<Reading>,
}

impl ReadingStore {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    pub fn from_combined(combined: CombinedReadings) -> Self {
        Self::new(combined.readings)
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Distinct locations, sorted
    pub fn locations(&self) -> Vec<String> {
        self.readings
            .iter()
            .map(|r| r.location.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn for_location(&self, location: &str) -> Vec<Reading> {
        self.readings
            .iter()
            .filter(|r| r.location == location)
            .cloned()
            .collect()
    }

    /// Readings whose calendar date (in `time_ref`) falls inside `range`
    pub fn in_date_range(&self, range: DateRange, time_ref: TimeReference) -> Vec<Reading> {
        self.readings
            .iter()
            .filter(|r| range.contains(time_ref.date_of(&r.timestamp)))
            .cloned()
            .collect()
    }

    /// Every metric column seen on any reading, sorted
    pub fn metric_names(&self) -> Vec<String> {
        self.readings
            .iter()
            .flat_map(|r| r.metrics.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl From<Vec<Reading>> for ReadingStore {
    fn from(readings: Vec<Reading>) -> Self {
        Self::new(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn make_reading(location: &str, day: u32, metric: &str, value: Option<f64>) -> Reading {
        Reading::new(location, Utc.with_ymd_and_hms(2024, 9, day, 12, 0, 0).unwrap())
            .with_metric(metric, value)
    }

    fn make_store() -> ReadingStore {
        ReadingStore::new(vec![
            make_reading("Kandy", 2, "pm10", Some(30.0)),
            make_reading("Colombo", 3, "pm2_5", Some(12.0)),
            make_reading("Kandy", 5, "dust", None),
        ])
    }

    #[test]
    fn test_empty_store() {
        let store = ReadingStore::default();
        assert!(store.is_empty());
        assert!(store.locations().is_empty());
        assert!(store.metric_names().is_empty());
    }

    #[test]
    fn test_locations_sorted_distinct() {
        assert_eq!(make_store().locations(), vec!["Colombo", "Kandy"]);
    }

    #[test]
    fn test_for_location() {
        let store = make_store();
        let kandy = store.for_location("Kandy");
        assert_eq!(kandy.len(), 2);
        assert!(kandy.iter().all(|r| r.location == "Kandy"));
        assert!(store.for_location("Galle").is_empty());
    }

    #[test]
    fn test_in_date_range() {
        let store = make_store();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 9, 3).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 5).unwrap(),
        )
        .unwrap();
        let filtered = store.in_date_range(range, TimeReference::Utc);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_metric_names_include_null_columns() {
        assert_eq!(make_store().metric_names(), vec!["dust", "pm10", "pm2_5"]);
    }
}
