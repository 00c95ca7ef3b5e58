//! Multi-location combiner
//!
//! Merges per-location reading sets into one table. A location that fails to
//! load (missing source, parse failure, timeout) is excluded and reported;
//! it never aborts the others.

use crate::sources::LocationSource;
use crate::types::{LoadFailure, LoadFailureKind, Reading};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default per-location load budget
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Readings from every successfully loaded location
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CombinedReadings {
    pub readings: Vec<Reading>,
    /// Loaded locations, in configuration order
    pub locations: Vec<String>,
}

/// Combined data plus the locations that could not be loaded
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CombineReport {
    pub combined: CombinedReadings,
    pub failures: Vec<LoadFailure>,
}

impl CombineReport {
    pub fn attempted(&self) -> usize {
        self.combined.locations.len() + self.failures.len()
    }

    pub fn loaded(&self) -> usize {
        self.combined.locations.len()
    }

    /// e.g. "9 of 10 locations loaded"
    pub fn summary(&self) -> String {
        format!("{} of {} locations loaded", self.loaded(), self.attempted())
    }
}

/// Merge per-location outcomes, tagging every reading with its location.
pub fn combine<I>(per_location: I) -> CombineReport
where
    I: IntoIterator<Item = (String, std::result::Result<Vec<Reading>, LoadFailureKind>)>,
{
    let mut report = CombineReport::default();

    for (location, outcome) in per_location {
        match outcome {
            Ok(readings) => {
                report
                    .combined
                    .readings
                    .extend(readings.into_iter().map(|mut r| {
                        r.location.clone_from(&location);
                        r
                    }));
                if !report.combined.locations.contains(&location) {
                    report.combined.locations.push(location);
                }
            }
            Err(kind) => {
                warn!(location = %location, reason = %kind, "excluding location");
                report.failures.push(LoadFailure { location, kind });
            }
        }
    }

    report
}

/// Concurrency and timeout settings for [`load_all`]
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub max_concurrency: usize,
    pub timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }
}

/// Load every source concurrently (bounded by `max_concurrency`) and combine.
/// A source exceeding `timeout` is reported as a timeout failure; the
/// combiner stops waiting on it and keeps the rest.
pub async fn load_all(sources: &[Arc<dyn LocationSource>], options: LoadOptions) -> CombineReport {
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));

    let handles: Vec<_> = sources
        .iter()
        .map(|source| {
            let source = Arc::clone(source);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(load_one(source, semaphore, options.timeout))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (source, handle) in sources.iter().zip(handles) {
        let outcome = handle
            .await
            .unwrap_or_else(|e| Err(LoadFailureKind::Source(format!("load task failed: {}", e))));
        outcomes.push((source.location().to_string(), outcome));
    }

    let report = combine(outcomes);
    info!("{}", report.summary());
    report
}

async fn load_one(
    source: Arc<dyn LocationSource>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
) -> std::result::Result<Vec<Reading>, LoadFailureKind> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| LoadFailureKind::Source(e.to_string()))?;

    let location = source.location().to_string();
    debug!(location = %location, "loading");

    let task = tokio::task::spawn_blocking(move || source.load());
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(readings))) => {
            debug!(location = %location, count = readings.len(), "loaded");
            Ok(readings)
        }
        Ok(Ok(Err(e))) => Err(LoadFailureKind::Source(e.to_string())),
        Ok(Err(e)) => Err(LoadFailureKind::Source(format!("loader panicked: {}", e))),
        Err(_) => {
            warn!(location = %location, ?timeout, "load timed out");
            Err(LoadFailureKind::Timeout(timeout))
        }
    }
}
