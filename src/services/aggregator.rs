//! Aggregator service for calendar-aligned reductions over readings

use crate::types::{
    AirQualityStatus, AirtrackError, DailyAggregate, DateRange, LocationMean, MonthlyAggregate,
    MonthlyTotal, PeriodSummary, Reading, Reducer, Result, TimeReference,
};
use chrono::{Month, NaiveDate};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Metric names used for the air quality status band
const STATUS_PM10: &str = "pm10";
const STATUS_PM25: &str = "pm2_5";
const STATUS_CO: &str = "carbon_monoxide";

/// Aggregator for computing daily/monthly statistics
pub struct Aggregator;

impl Aggregator {
    /// Mean per (location, date, metric), sorted by location, date, then metric
    /// in the caller's order. Buckets with only null samples yield `mean: None`.
    pub fn daily<S: AsRef<str> + Sync>(
        readings: &[Reading],
        metrics: &[S],
        time_ref: TimeReference,
        range: Option<DateRange>,
    ) -> Result<Vec<DailyAggregate>> {
        if readings.is_empty() {
            return Err(AirtrackError::NoData("no readings to aggregate".into()));
        }
        ensure_metrics_observed(readings, metrics)?;
        Ok(reduce_daily(readings, metrics, time_ref, range))
    }

    /// Reduce per (location, month, metric). Rows follow `month_order`, then
    /// location, then metric. Months without data produce no rows.
    pub fn monthly<S: AsRef<str> + Sync>(
        readings: &[Reading],
        metrics: &[S],
        reducer: Reducer,
        month_order: &[Month],
        time_ref: TimeReference,
    ) -> Result<Vec<MonthlyAggregate>> {
        if readings.is_empty() {
            return Err(AirtrackError::NoData("no readings to aggregate".into()));
        }
        ensure_metrics_observed(readings, metrics)?;
        let buckets = group_by_month(readings, month_order, time_ref)?;

        let buckets: Vec<_> = buckets.into_iter().collect();
        let result = buckets
            .par_iter()
            .flat_map_iter(|((idx, location), group)| {
                let month = month_order[*idx];
                metrics.iter().map(move |metric| {
                    let metric = metric.as_ref();
                    let values: Vec<f64> = group.iter().filter_map(|r| r.value(metric)).collect();
                    MonthlyAggregate {
                        location: location.to_string(),
                        month,
                        metric: metric.to_string(),
                        reducer,
                        value: reducer.apply(&values),
                    }
                })
            })
            .collect();

        Ok(result)
    }

    /// Per (month, location) total of the row-wise sum of `metrics`.
    /// Null samples contribute nothing to a row's sum.
    pub fn monthly_totals<S: AsRef<str>>(
        readings: &[Reading],
        metrics: &[S],
        month_order: &[Month],
        time_ref: TimeReference,
    ) -> Result<Vec<MonthlyTotal>> {
        if readings.is_empty() {
            return Err(AirtrackError::NoData("no readings to aggregate".into()));
        }
        ensure_metrics_observed(readings, metrics)?;
        let buckets = group_by_month(readings, month_order, time_ref)?;

        Ok(buckets
            .into_iter()
            .map(|((idx, location), group)| MonthlyTotal {
                location: location.to_string(),
                month: month_order[idx],
                total: group
                    .iter()
                    .flat_map(|r| metrics.iter().filter_map(move |m| r.value(m.as_ref())))
                    .sum(),
            })
            .collect())
    }

    /// Mean of daily means for one location over one calendar month,
    /// plus the status band when pm10, pm2_5 and carbon_monoxide are available.
    pub fn period_summary<S: AsRef<str> + Sync>(
        readings: &[Reading],
        metrics: &[S],
        location: &str,
        month: Month,
        time_ref: TimeReference,
    ) -> Result<PeriodSummary> {
        ensure_metrics_observed(readings, metrics)?;

        let window: Vec<Reading> = readings
            .iter()
            .filter(|r| r.location == location && time_ref.month_of(&r.timestamp) == month)
            .cloned()
            .collect();

        let daily = reduce_daily(&window, metrics, time_ref, None);

        let day_count = daily.iter().map(|d| d.date).collect::<BTreeSet<_>>().len();
        let means: BTreeMap<String, Option<f64>> = metrics
            .iter()
            .map(|metric| {
                let metric = metric.as_ref();
                let values: Vec<f64> = daily
                    .iter()
                    .filter(|d| d.metric == metric)
                    .filter_map(|d| d.mean)
                    .collect();
                (metric.to_string(), Reducer::Mean.apply(&values))
            })
            .collect();

        let lookup = |m: &str| means.get(m).copied().flatten();
        let status = AirQualityStatus::classify(
            lookup(STATUS_PM10),
            lookup(STATUS_PM25),
            lookup(STATUS_CO),
        );

        Ok(PeriodSummary {
            location: location.to_string(),
            month,
            day_count,
            means,
            status,
        })
    }

    /// Mean of `metric` per location, sorted by location
    pub fn location_means(readings: &[Reading], metric: &str) -> Result<Vec<LocationMean>> {
        ensure_metrics_observed(readings, &[metric])?;

        let mut by_location: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for reading in readings {
            let values = by_location.entry(reading.location.as_str()).or_default();
            if let Some(v) = reading.value(metric) {
                values.push(v);
            }
        }

        Ok(by_location
            .into_iter()
            .map(|(location, values)| LocationMean {
                location: location.to_string(),
                metric: metric.to_string(),
                mean: Reducer::Mean.apply(&values),
                samples: values.len(),
            })
            .collect())
    }
}

/// Mean per (location, date, metric) without metric validation
pub(crate) fn reduce_daily<S: AsRef<str> + Sync>(
    readings: &[Reading],
    metrics: &[S],
    time_ref: TimeReference,
    range: Option<DateRange>,
) -> Vec<DailyAggregate> {
    // Group by (location, date)
    let mut buckets: BTreeMap<(&str, NaiveDate), Vec<&Reading>> = BTreeMap::new();
    for reading in readings {
        let date = time_ref.date_of(&reading.timestamp);
        if range.is_some_and(|r| !r.contains(date)) {
            continue;
        }
        buckets
            .entry((reading.location.as_str(), date))
            .or_default()
            .push(reading);
    }

    let buckets: Vec<_> = buckets.into_iter().collect();
    buckets
        .par_iter()
        .flat_map_iter(|((location, date), group)| {
            metrics.iter().map(move |metric| {
                let metric = metric.as_ref();
                let values: Vec<f64> = group.iter().filter_map(|r| r.value(metric)).collect();
                DailyAggregate {
                    location: location.to_string(),
                    date: *date,
                    metric: metric.to_string(),
                    mean: Reducer::Mean.apply(&values),
                }
            })
        })
        .collect()
}

/// Fails with `InvalidMetric` if a requested metric is absent from every reading
pub(crate) fn ensure_metrics_observed<S: AsRef<str>>(readings: &[Reading], metrics: &[S]) -> Result<()> {
    if metrics.is_empty() {
        return Err(AirtrackError::InvalidMetric("no metrics requested".into()));
    }
    for metric in metrics {
        let metric = metric.as_ref();
        if !readings.iter().any(|r| r.has_metric(metric)) {
            return Err(AirtrackError::InvalidMetric(metric.to_string()));
        }
    }
    Ok(())
}

/// Group readings by (position in `month_order`, location).
/// Fails with `UnknownMonth` when a reading falls outside the window.
fn group_by_month<'a>(
    readings: &'a [Reading],
    month_order: &[Month],
    time_ref: TimeReference,
) -> Result<BTreeMap<(usize, &'a str), Vec<&'a Reading>>> {
    if month_order.is_empty() {
        return Err(AirtrackError::Config("month order is empty".into()));
    }

    let mut positions: HashMap<Month, usize> = HashMap::with_capacity(month_order.len());
    for (idx, month) in month_order.iter().enumerate() {
        positions.entry(*month).or_insert(idx);
    }

    let mut buckets: BTreeMap<(usize, &str), Vec<&Reading>> = BTreeMap::new();
    for reading in readings {
        let month = time_ref.month_of(&reading.timestamp);
        let idx = *positions
            .get(&month)
            .ok_or_else(|| AirtrackError::UnknownMonth {
                location: reading.location.clone(),
                month: month.name().to_string(),
            })?;
        buckets
            .entry((idx, reading.location.as_str()))
            .or_default()
            .push(reading);
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_reading(
        location: &str,
        month: u32,
        day: u32,
        hour: u32,
        values: &[(&str, Option<f64>)],
    ) -> Reading {
        let mut reading = Reading::new(
            location,
            Utc.with_ymd_and_hms(2024, month, day, hour, 0, 0).unwrap(),
        );
        for (name, value) in values {
            reading = reading.with_metric(*name, *value);
        }
        reading
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    const WINDOW: [Month; 4] = [
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    // ========== daily() tests ==========

    #[test]
    fn test_daily_empty_readings() {
        let result = Aggregator::daily(&[], &["uv_index"], TimeReference::Utc, None);
        assert!(matches!(result, Err(AirtrackError::NoData(_))));
    }

    #[test]
    fn test_daily_singleton_identity() {
        let readings = vec![
            make_reading("A", 9, 2, 10, &[("uv", Some(10.0))]),
            make_reading("A", 9, 4, 10, &[("uv", Some(20.0))]),
        ];

        let result = Aggregator::daily(&readings, &["uv"], TimeReference::Utc, None).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].date, date(9, 2));
        assert_eq!(result[0].mean, Some(10.0));
        assert_eq!(result[1].date, date(9, 4));
        assert_eq!(result[1].mean, Some(20.0));
    }

    #[test]
    fn test_daily_mean_skips_nulls() {
        let readings = vec![
            make_reading("A", 9, 2, 1, &[("pm10", Some(10.0))]),
            make_reading("A", 9, 2, 2, &[("pm10", None)]),
            make_reading("A", 9, 2, 3, &[("pm10", Some(30.0))]),
            make_reading("A", 9, 2, 4, &[("pm10", Some(f64::NAN))]),
        ];

        let result = Aggregator::daily(&readings, &["pm10"], TimeReference::Utc, None).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].mean, Some(20.0));
    }

    #[test]
    fn test_daily_all_null_bucket_is_explicit_none() {
        let readings = vec![
            make_reading("A", 9, 2, 1, &[("pm10", Some(5.0)), ("dust", None)]),
            make_reading("A", 9, 3, 1, &[("pm10", None), ("dust", None)]),
        ];

        let result =
            Aggregator::daily(&readings, &["pm10", "dust"], TimeReference::Utc, None).unwrap();

        // Every (date, metric) pair is present
        assert_eq!(result.len(), 4);
        let sept3_pm10 = result
            .iter()
            .find(|d| d.date == date(9, 3) && d.metric == "pm10")
            .unwrap();
        assert_eq!(sept3_pm10.mean, None);
        assert!(result.iter().filter(|d| d.metric == "dust").all(|d| d.mean.is_none()));
    }

    #[test]
    fn test_daily_invalid_metric() {
        let readings = vec![make_reading("A", 9, 2, 1, &[("pm10", Some(5.0))])];
        let result = Aggregator::daily(&readings, &["pm10", "ozone"], TimeReference::Utc, None);
        match result {
            Err(AirtrackError::InvalidMetric(name)) => assert_eq!(name, "ozone"),
            other => panic!("expected InvalidMetric, got {:?}", other),
        }
    }

    #[test]
    fn test_daily_no_metrics_requested() {
        let readings = vec![make_reading("A", 9, 2, 1, &[("pm10", Some(5.0))])];
        let metrics: [&str; 0] = [];
        let result = Aggregator::daily(&readings, &metrics, TimeReference::Utc, None);
        assert!(matches!(result, Err(AirtrackError::InvalidMetric(_))));
    }

    #[test]
    fn test_daily_metric_present_only_as_null_is_valid() {
        let readings = vec![make_reading("A", 9, 2, 1, &[("so2", None)])];
        let result = Aggregator::daily(&readings, &["so2"], TimeReference::Utc, None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].mean, None);
    }

    #[test]
    fn test_daily_sorted_by_location_then_date_then_metric_order() {
        let readings = vec![
            make_reading("B", 9, 3, 1, &[("pm10", Some(1.0)), ("dust", Some(2.0))]),
            make_reading("A", 9, 4, 1, &[("pm10", Some(3.0)), ("dust", Some(4.0))]),
            make_reading("A", 9, 2, 1, &[("pm10", Some(5.0)), ("dust", Some(6.0))]),
        ];

        let result =
            Aggregator::daily(&readings, &["pm10", "dust"], TimeReference::Utc, None).unwrap();

        let keys: Vec<(&str, NaiveDate, &str)> = result
            .iter()
            .map(|d| (d.location.as_str(), d.date, d.metric.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A", date(9, 2), "pm10"),
                ("A", date(9, 2), "dust"),
                ("A", date(9, 4), "pm10"),
                ("A", date(9, 4), "dust"),
                ("B", date(9, 3), "pm10"),
                ("B", date(9, 3), "dust"),
            ]
        );
    }

    #[test]
    fn test_daily_respects_time_reference() {
        // 20:00 UTC on the 1st is the 2nd at +05:30
        let readings = vec![
            make_reading("A", 9, 1, 20, &[("uv", Some(4.0))]),
            make_reading("A", 9, 2, 6, &[("uv", Some(8.0))]),
        ];
        let colombo: TimeReference = "+05:30".parse().unwrap();

        let utc = Aggregator::daily(&readings, &["uv"], TimeReference::Utc, None).unwrap();
        let local = Aggregator::daily(&readings, &["uv"], colombo, None).unwrap();

        assert_eq!(utc.len(), 2);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].date, date(9, 2));
        assert_eq!(local[0].mean, Some(6.0));
    }

    #[test]
    fn test_daily_date_range_filter() {
        let readings = vec![
            make_reading("A", 9, 1, 1, &[("uv", Some(1.0))]),
            make_reading("A", 9, 2, 1, &[("uv", Some(2.0))]),
            make_reading("A", 9, 3, 1, &[("uv", Some(3.0))]),
        ];
        let range = DateRange::new(date(9, 2), date(9, 3)).unwrap();

        let result =
            Aggregator::daily(&readings, &["uv"], TimeReference::Utc, Some(range)).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].date, date(9, 2));
    }

    #[test]
    fn test_daily_tolerates_duplicate_timestamps() {
        let readings = vec![
            make_reading("A", 9, 2, 1, &[("uv", Some(2.0))]),
            make_reading("A", 9, 2, 1, &[("uv", Some(4.0))]),
        ];
        let result = Aggregator::daily(&readings, &["uv"], TimeReference::Utc, None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].mean, Some(3.0));
    }

    #[test]
    fn test_daily_is_reproducible() {
        let readings: Vec<Reading> = (1..=28)
            .flat_map(|day| {
                (0..24).map(move |hour| {
                    make_reading(
                        if hour % 2 == 0 { "A" } else { "B" },
                        9,
                        day,
                        hour,
                        &[("pm10", Some((day * hour) as f64))],
                    )
                })
            })
            .collect();

        let first = Aggregator::daily(&readings, &["pm10"], TimeReference::Utc, None).unwrap();
        let second = Aggregator::daily(&readings, &["pm10"], TimeReference::Utc, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 56);
    }

    // ========== monthly() tests ==========

    #[test]
    fn test_monthly_follows_month_order_not_lexical() {
        let readings = vec![
            make_reading("A", 12, 1, 1, &[("dust", Some(4.0))]),
            make_reading("A", 9, 1, 1, &[("dust", Some(1.0))]),
            make_reading("A", 11, 1, 1, &[("dust", Some(3.0))]),
            make_reading("A", 10, 1, 1, &[("dust", Some(2.0))]),
        ];

        let result = Aggregator::monthly(
            &readings,
            &["dust"],
            Reducer::Max,
            &WINDOW,
            TimeReference::Utc,
        )
        .unwrap();

        let months: Vec<Month> = result.iter().map(|m| m.month).collect();
        assert_eq!(months, WINDOW.to_vec());
    }

    #[test]
    fn test_monthly_reducers() {
        let readings = vec![
            make_reading("A", 9, 1, 1, &[("co", Some(2.0))]),
            make_reading("A", 9, 2, 1, &[("co", Some(6.0))]),
            make_reading("A", 9, 3, 1, &[("co", None)]),
        ];

        let run = |reducer| {
            let rows =
                Aggregator::monthly(&readings, &["co"], reducer, &WINDOW, TimeReference::Utc)
                    .unwrap();
            rows[0].value
        };

        assert_eq!(run(Reducer::Mean), Some(4.0));
        assert_eq!(run(Reducer::Max), Some(6.0));
        assert_eq!(run(Reducer::Sum), Some(8.0));
    }

    #[test]
    fn test_monthly_absent_month_has_no_row() {
        let readings = vec![
            make_reading("A", 9, 1, 1, &[("co", Some(1.0))]),
            make_reading("A", 11, 1, 1, &[("co", Some(1.0))]),
            make_reading("B", 10, 1, 1, &[("co", Some(1.0))]),
        ];

        let result =
            Aggregator::monthly(&readings, &["co"], Reducer::Sum, &WINDOW, TimeReference::Utc)
                .unwrap();

        let keys: Vec<(Month, &str)> = result
            .iter()
            .map(|m| (m.month, m.location.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (Month::September, "A"),
                (Month::October, "B"),
                (Month::November, "A"),
            ]
        );
    }

    #[test]
    fn test_monthly_all_null_bucket_is_none() {
        let readings = vec![make_reading("A", 9, 1, 1, &[("co", None)])];
        let result =
            Aggregator::monthly(&readings, &["co"], Reducer::Sum, &WINDOW, TimeReference::Utc)
                .unwrap();
        assert_eq!(result[0].value, None);
    }

    #[test]
    fn test_monthly_unknown_month() {
        let readings = vec![
            make_reading("A", 9, 1, 1, &[("co", Some(1.0))]),
            make_reading("Kandy", 8, 31, 1, &[("co", Some(1.0))]),
        ];

        let result =
            Aggregator::monthly(&readings, &["co"], Reducer::Max, &WINDOW, TimeReference::Utc);

        match result {
            Err(AirtrackError::UnknownMonth { location, month }) => {
                assert_eq!(location, "Kandy");
                assert_eq!(month, "August");
            }
            other => panic!("expected UnknownMonth, got {:?}", other),
        }
    }

    #[test]
    fn test_monthly_invalid_metric() {
        let readings = vec![make_reading("A", 9, 1, 1, &[("co", Some(1.0))])];
        let result =
            Aggregator::monthly(&readings, &["no2"], Reducer::Max, &WINDOW, TimeReference::Utc);
        assert!(matches!(result, Err(AirtrackError::InvalidMetric(_))));
    }

    #[test]
    fn test_monthly_empty_month_order() {
        let readings = vec![make_reading("A", 9, 1, 1, &[("co", Some(1.0))])];
        let result =
            Aggregator::monthly(&readings, &["co"], Reducer::Max, &[], TimeReference::Utc);
        assert!(matches!(result, Err(AirtrackError::Config(_))));
    }

    // ========== monthly_totals() tests ==========

    #[test]
    fn test_monthly_totals_sum_across_metrics() {
        let readings = vec![
            make_reading("A", 10, 1, 1, &[("co", Some(1.0)), ("dust", Some(2.0))]),
            make_reading("A", 10, 2, 1, &[("co", None), ("dust", Some(3.0))]),
            make_reading("A", 9, 2, 1, &[("co", Some(10.0)), ("dust", None)]),
        ];

        let result =
            Aggregator::monthly_totals(&readings, &["co", "dust"], &WINDOW, TimeReference::Utc)
                .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].month, Month::September);
        assert_eq!(result[0].total, 10.0);
        assert_eq!(result[1].month, Month::October);
        assert_eq!(result[1].total, 6.0);
    }

    // ========== period_summary() tests ==========

    #[test]
    fn test_period_summary_mean_of_daily_means() {
        const CO: &str = "carbon_monoxide";
        let readings = vec![
            // Sept 2: pm10 daily mean 20
            make_reading("A", 9, 2, 1, &[("pm10", Some(10.0)), ("pm2_5", Some(5.0)), (CO, Some(100.0))]),
            make_reading("A", 9, 2, 2, &[("pm10", Some(30.0)), ("pm2_5", Some(5.0)), (CO, Some(100.0))]),
            // Sept 3: pm10 daily mean 40
            make_reading("A", 9, 3, 1, &[("pm10", Some(40.0)), ("pm2_5", Some(15.0)), (CO, Some(300.0))]),
            // Other month and location are excluded
            make_reading("A", 10, 1, 1, &[("pm10", Some(500.0))]),
            make_reading("B", 9, 2, 1, &[("pm10", Some(500.0))]),
        ];

        let summary = Aggregator::period_summary(
            &readings,
            &["pm10", "pm2_5", CO],
            "A",
            Month::September,
            TimeReference::Utc,
        )
        .unwrap();

        assert_eq!(summary.day_count, 2);
        assert_eq!(summary.mean("pm10"), Some(30.0));
        assert_eq!(summary.mean("pm2_5"), Some(10.0));
        assert_eq!(summary.mean(CO), Some(200.0));
        assert_eq!(summary.status, Some(AirQualityStatus::Good));
    }

    #[test]
    fn test_period_summary_empty_window() {
        let readings = vec![make_reading("A", 9, 2, 1, &[("pm10", Some(10.0))])];

        let summary = Aggregator::period_summary(
            &readings,
            &["pm10"],
            "A",
            Month::December,
            TimeReference::Utc,
        )
        .unwrap();

        assert_eq!(summary.day_count, 0);
        assert_eq!(summary.mean("pm10"), None);
        assert_eq!(summary.status, None);
    }

    #[test]
    fn test_period_summary_metric_only_seen_elsewhere() {
        let readings = vec![
            make_reading("A", 9, 2, 1, &[("pm10", Some(10.0))]),
            make_reading("B", 9, 2, 1, &[("dust", Some(3.0))]),
        ];

        let summary = Aggregator::period_summary(
            &readings,
            &["pm10", "dust"],
            "A",
            Month::September,
            TimeReference::Utc,
        )
        .unwrap();

        assert_eq!(summary.mean("pm10"), Some(10.0));
        assert_eq!(summary.mean("dust"), None);
        assert!(summary.means.contains_key("dust"));
    }

    // ========== location_means() tests ==========

    #[test]
    fn test_location_means() {
        let readings = vec![
            make_reading("Kandy", 9, 2, 1, &[("pm10", Some(10.0))]),
            make_reading("Colombo", 9, 2, 1, &[("pm10", Some(40.0))]),
            make_reading("Kandy", 9, 3, 1, &[("pm10", Some(20.0))]),
            make_reading("Galle", 9, 3, 1, &[("pm10", None)]),
        ];

        let result = Aggregator::location_means(&readings, "pm10").unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].location, "Colombo");
        assert_eq!(result[0].mean, Some(40.0));
        assert_eq!(result[1].location, "Galle");
        assert_eq!(result[1].mean, None);
        assert_eq!(result[1].samples, 0);
        assert_eq!(result[2].location, "Kandy");
        assert_eq!(result[2].mean, Some(15.0));
        assert_eq!(result[2].samples, 2);
    }

    #[test]
    fn test_location_means_invalid_metric() {
        let readings = vec![make_reading("Kandy", 9, 2, 1, &[("pm10", Some(10.0))])];
        assert!(matches!(
            Aggregator::location_means(&readings, "ozone"),
            Err(AirtrackError::InvalidMetric(_))
        ));
    }
}
