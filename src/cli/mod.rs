use crate::config::Config;
use crate::services::{
    build_weekly_pivots, evaluate_alerts, load_all, AlertReport, Aggregator, DailyAggregateCache,
    ReadingStore,
};
use crate::sources::SourceRegistry;
use crate::types::{
    AlertResult, AlertRule, DailyAggregate, DateRange, Reducer, TimeReference, WeeklyPivotGrid,
    WEEKDAYS,
};
use anyhow::{bail, Context};
use chrono::{Month, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Air quality aggregation and alerting over per-location sensor readings
#[derive(Parser)]
#[command(name = "airtrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct GlobalOpts {
    /// Config file (default: ~/.airtrack/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory with one <location>.jsonl per location
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Location to load (repeatable; default: every file in the data dir)
    #[arg(long = "location", global = true)]
    locations: Vec<String>,

    /// Metric to aggregate (repeatable; overrides the configured list)
    #[arg(long = "metric", global = true)]
    metrics: Vec<String>,

    /// Time reference for day boundaries: "utc" or an offset like +05:30
    #[arg(long, global = true)]
    tz: Option<String>,

    /// Recompute daily aggregates instead of using the cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily mean per location and metric
    Daily {
        /// First date to include
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date to include
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Monthly reduction per location and metric
    Monthly {
        /// mean, max or sum (overrides config)
        #[arg(long)]
        reducer: Option<Reducer>,

        /// Total across all metrics per location and month
        #[arg(long)]
        totals: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Day-of-week x week grid of daily means, one per location
    Weekly {
        /// Metric to pivot
        #[arg(value_name = "METRIC")]
        pivot_metric: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Flag readings exceeding alert thresholds
    Alerts {
        /// Rule as metric>value (repeatable; overrides config)
        #[arg(long = "rule")]
        rules: Vec<AlertRule>,

        /// List every reading, not only flagged ones
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mean levels and status for one location and month
    Summary {
        location: String,

        /// Month name, e.g. October
        month: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare the mean of one metric across locations
    Compare {
        #[arg(value_name = "METRIC")]
        compare_metric: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.opts.verbose
    }

    pub fn run(self) -> anyhow::Result<()> {
        let config = self.opts.resolve_config()?;
        let time_ref = config.time_ref()?;
        let store = load_store(&config, time_ref)?;

        match self.command {
            Commands::Daily { from, to, json } => {
                let range = match (from, to) {
                    (None, None) => None,
                    (start, end) => Some(DateRange::new(
                        start.unwrap_or(NaiveDate::MIN),
                        end.unwrap_or(NaiveDate::MAX),
                    )?),
                };
                let mut rows = daily_rows(&store, &config.metrics, time_ref, self.opts.no_cache)?;
                if let Some(range) = range {
                    rows.retain(|row| range.contains(row.date));
                }
                if json {
                    print_json(&rows)?;
                } else {
                    print_daily(&rows);
                }
            }
            Commands::Monthly {
                reducer,
                totals,
                json,
            } => {
                let months = config.month_order()?;
                if totals {
                    let rows = Aggregator::monthly_totals(
                        store.readings(),
                        &config.metrics,
                        &months,
                        time_ref,
                    )?;
                    if json {
                        print_json(&rows)?;
                    } else {
                        for row in &rows {
                            println!(
                                "{:<16} {:<10} {:>12}",
                                row.location,
                                row.month.name(),
                                fmt_value(Some(row.total))
                            );
                        }
                    }
                } else {
                    let reducer = reducer.unwrap_or(config.reducer);
                    let rows = Aggregator::monthly(
                        store.readings(),
                        &config.metrics,
                        reducer,
                        &months,
                        time_ref,
                    )?;
                    if json {
                        print_json(&rows)?;
                    } else {
                        println!(
                            "{:<16} {:<10} {:<18} {:>10}",
                            "LOCATION",
                            "MONTH",
                            "METRIC",
                            reducer.label().to_uppercase()
                        );
                        for row in &rows {
                            println!(
                                "{:<16} {:<10} {:<18} {:>10}",
                                row.location,
                                row.month.name(),
                                row.metric,
                                fmt_value(row.value)
                            );
                        }
                    }
                }
            }
            Commands::Weekly { pivot_metric, json } => {
                let rows = daily_rows(
                    &store,
                    std::slice::from_ref(&pivot_metric),
                    time_ref,
                    self.opts.no_cache,
                )?;
                let grids = build_weekly_pivots(&rows, &pivot_metric)?;
                if json {
                    print_json(&grids)?;
                } else {
                    for grid in &grids {
                        print_grid(grid);
                    }
                }
            }
            Commands::Alerts { rules, all, json } => {
                let rules = if rules.is_empty() { config.rules.clone() } else { rules };
                let results = evaluate_alerts(store.readings(), &rules)?;
                let report = AlertReport::from_results(&results, &rules);
                let shown: Vec<_> = results.iter().filter(|r| all || r.flagged).collect();

                if json {
                    print_json(&AlertOutput {
                        report: &report,
                        results: &shown,
                    })?;
                } else {
                    for result in &shown {
                        let triggered = if result.triggered.is_empty() {
                            "-".to_string()
                        } else {
                            result.triggered.join(", ")
                        };
                        println!(
                            "{}  {:<16} {}",
                            result.record.timestamp.format("%Y-%m-%d %H:%M"),
                            result.record.location,
                            triggered
                        );
                    }
                    println!();
                    println!("{} of {} readings flagged", report.flagged, report.total);
                    for hits in &report.per_rule {
                        println!("  {:<28} {:>6}", hits.rule.to_string(), hits.hits);
                    }
                }
            }
            Commands::Summary {
                location,
                month,
                json,
            } => {
                let month: Month = month
                    .parse()
                    .map_err(|_| anyhow::anyhow!("unknown month '{}'", month))?;
                if !store.locations().contains(&location) {
                    bail!("location '{}' was not loaded", location);
                }
                let summary = Aggregator::period_summary(
                    store.readings(),
                    &config.metrics,
                    &location,
                    month,
                    time_ref,
                )?;
                if json {
                    print_json(&summary)?;
                } else {
                    println!(
                        "{} / {} ({} days)",
                        summary.location,
                        summary.month.name(),
                        summary.day_count
                    );
                    for (metric, mean) in &summary.means {
                        println!("  {:<18} {:>10}", metric, fmt_value(*mean));
                    }
                    match summary.status {
                        Some(status) => println!("  status: {}", status.label()),
                        None => println!("  status: unavailable"),
                    }
                }
            }
            Commands::Compare {
                compare_metric,
                json,
            } => {
                let means = Aggregator::location_means(store.readings(), &compare_metric)?;
                if json {
                    print_json(&means)?;
                } else {
                    for row in &means {
                        println!(
                            "{:<16} {:>10}  ({} samples)",
                            row.location,
                            fmt_value(row.mean),
                            row.samples
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

impl GlobalOpts {
    /// Config file values with command-line overrides applied
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if !self.locations.is_empty() {
            config.locations = self.locations.clone();
        }
        if !self.metrics.is_empty() {
            config.metrics = self.metrics.clone();
        }
        if let Some(tz) = &self.tz {
            config.time_reference = tz.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Load every configured location concurrently; failures are reported on
/// stderr and excluded.
fn load_store(config: &Config, time_ref: TimeReference) -> anyhow::Result<ReadingStore> {
    let data_dir = config.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let registry = if config.locations.is_empty() {
        SourceRegistry::discover(&data_dir, time_ref)
    } else {
        SourceRegistry::for_locations(&data_dir, &config.locations, time_ref)
    };
    if registry.is_empty() {
        bail!("no location files (*.jsonl) found in {}", data_dir.display());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let report = runtime.block_on(load_all(registry.sources(), config.load_options()));

    eprintln!("{}", report.summary());
    for failure in &report.failures {
        eprintln!("  skipped {}", failure);
    }
    if report.loaded() == 0 {
        bail!("no location could be loaded");
    }

    Ok(ReadingStore::from_combined(report.combined))
}

/// Daily aggregates for every loaded location, through the cache unless disabled
fn daily_rows(
    store: &ReadingStore,
    metrics: &[String],
    time_ref: TimeReference,
    no_cache: bool,
) -> anyhow::Result<Vec<DailyAggregate>> {
    if no_cache {
        return Ok(Aggregator::daily(store.readings(), metrics, time_ref, None)?);
    }

    let cache = DailyAggregateCache::new()?;
    let mut rows = Vec::new();
    for location in store.locations() {
        let (aggregates, warning) =
            cache.load_or_compute(&location, store.readings(), metrics, time_ref)?;
        if let Some(warning) = warning {
            warn!(location = %location, ?warning, "daily cache unusable, recomputed");
        }
        rows.extend(aggregates);
    }
    debug!(rows = rows.len(), "daily aggregates ready");
    Ok(rows)
}

#[derive(Serialize)]
struct AlertOutput<'a> {
    report: &'a AlertReport,
    results: &'a [&'a AlertResult<'a>],
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_daily(rows: &[DailyAggregate]) {
    println!("{:<16} {:<10} {:<18} {:>10}", "LOCATION", "DATE", "METRIC", "MEAN");
    for row in rows {
        println!(
            "{:<16} {:<10} {:<18} {:>10}",
            row.location,
            row.date.to_string(),
            row.metric,
            fmt_value(row.mean)
        );
    }
}

fn print_grid(grid: &WeeklyPivotGrid) {
    println!("{} / {}", grid.location, grid.metric);
    print!("{:<4}", "");
    for anchor in &grid.week_anchors {
        print!(" {:>8}", anchor.format("%m-%d").to_string());
    }
    println!();
    for (weekday, row) in WEEKDAYS.iter().zip(&grid.cells) {
        print!("{:<4}", weekday.to_string());
        for cell in row {
            print!(" {:>8}", fmt_value(*cell));
        }
        println!();
    }
    println!();
}

/// Two decimals, `-` for missing
fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}
