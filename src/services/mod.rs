//! Services for reading aggregation, alerting and loading

pub mod aggregator;
pub mod alerts;
pub mod cache;
pub mod combiner;
pub mod pivot;
pub mod store;

pub use aggregator::Aggregator;
pub use alerts::{evaluate_alerts, AlertReport, RuleHits};
pub use cache::DailyAggregateCache;
pub use combiner::{combine, load_all, CombineReport, CombinedReadings, LoadOptions};
pub use pivot::{build_weekly_pivot, build_weekly_pivots, week_anchor};
pub use store::ReadingStore;
