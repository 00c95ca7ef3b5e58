//! Daily aggregate cache
//!
//! Persists per-location daily aggregates so repeated reports over an
//! unchanged reading set skip recomputation. Entries are keyed by a
//! fingerprint of the inputs; any change to the readings, the metric list
//! or the time reference is a miss.

use crate::services::aggregator::{ensure_metrics_observed, reduce_daily};
use crate::types::{AirtrackError, CacheWarning, DailyAggregate, Reading, Result, TimeReference};
use directories::BaseDirs;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyAggregateCacheFile {
    pub location: String,
    pub fingerprint: String,
    pub updated_at: i64,
    pub aggregates: Vec<DailyAggregate>,
}

pub struct DailyAggregateCache {
    cache_dir: PathBuf,
}

impl DailyAggregateCache {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| AirtrackError::Cache("Cannot determine home directory".into()))?;
        let cache_dir = base_dirs.home_dir().join(".airtrack").join("cache");
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_path(&self, location: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_daily.json", location))
    }

    /// Identity of an aggregation input: reading count, timestamp bounds,
    /// a hash over every reading's timestamp and values, the metric list and
    /// the time reference.
    pub fn fingerprint<S: AsRef<str>>(
        readings: &[&Reading],
        metrics: &[S],
        time_ref: TimeReference,
    ) -> String {
        let first = readings.iter().map(|r| r.timestamp).min();
        let last = readings.iter().map(|r| r.timestamp).max();

        let mut hasher = DefaultHasher::new();
        for reading in readings {
            reading.timestamp.timestamp().hash(&mut hasher);
            reading.timestamp.timestamp_subsec_nanos().hash(&mut hasher);
            for metric in metrics {
                reading.value(metric.as_ref()).map(f64::to_bits).hash(&mut hasher);
            }
        }
        let metrics: Vec<&str> = metrics.iter().map(AsRef::as_ref).collect();

        format!(
            "n={};first={};last={};hash={:016x};metrics={};tz={}",
            readings.len(),
            first.map(|t| t.timestamp()).unwrap_or_default(),
            last.map(|t| t.timestamp()).unwrap_or_default(),
            hasher.finish(),
            metrics.join(","),
            time_ref,
        )
    }

    /// Daily aggregates for `location`, served from cache when the fingerprint
    /// matches and recomputed (then stored) otherwise. Metrics are validated
    /// against all of `readings`, so a metric seen only at other locations
    /// yields null means here. Returns (aggregates, optional_warning).
    pub fn load_or_compute<S: AsRef<str> + Sync>(
        &self,
        location: &str,
        readings: &[Reading],
        metrics: &[S],
        time_ref: TimeReference,
    ) -> Result<(Vec<DailyAggregate>, Option<CacheWarning>)> {
        ensure_metrics_observed(readings, metrics)?;

        let own: Vec<&Reading> = readings.iter().filter(|r| r.location == location).collect();
        if own.is_empty() {
            return Ok((Vec::new(), None));
        }

        let fingerprint = Self::fingerprint(&own, metrics, time_ref);
        let (cached, warning) = self.load_cached(location, &fingerprint);
        if let Some(aggregates) = cached {
            debug!(location, "daily cache hit");
            return Ok((aggregates, warning));
        }
        debug!(location, "daily cache miss");

        let owned: Vec<Reading> = own.into_iter().cloned().collect();
        let aggregates = reduce_daily(&owned, metrics, time_ref, None);
        self.save_cache(location, &fingerprint, &aggregates)?;

        Ok((aggregates, warning))
    }

    pub fn clear(&self, location: &str) -> Result<()> {
        let path = self.cache_path(location);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Cached aggregates if the stored fingerprint matches
    fn load_cached(
        &self,
        location: &str,
        fingerprint: &str,
    ) -> (Option<Vec<DailyAggregate>>, Option<CacheWarning>) {
        let path = self.cache_path(location);
        if !path.exists() {
            return (None, None);
        }

        let content = match read_shared(&path) {
            Ok(content) => content,
            Err(e) => return (None, Some(CacheWarning::LoadFailed(e.to_string()))),
        };

        match serde_json::from_str::<DailyAggregateCacheFile>(&content) {
            Ok(cache) if cache.fingerprint == fingerprint => (Some(cache.aggregates), None),
            Ok(_) => (None, None),
            Err(e) => (
                None,
                Some(CacheWarning::Corrupted(format!("Corrupted cache file: {}", e))),
            ),
        }
    }

    fn save_cache(
        &self,
        location: &str,
        fingerprint: &str,
        aggregates: &[DailyAggregate],
    ) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let cache = DailyAggregateCacheFile {
            location: location.to_string(),
            fingerprint: fingerprint.to_string(),
            updated_at: chrono::Utc::now().timestamp(),
            aggregates: aggregates.to_vec(),
        };
        let content = serde_json::to_string_pretty(&cache)
            .map_err(|e| AirtrackError::Cache(format!("Serialization failed: {}", e)))?;

        write_atomic(&self.cache_path(location), content.as_bytes())
    }
}

/// Read a whole file under a shared lock
fn read_shared(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    file.lock_shared()?;
    let mut content = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut content);
    let _ = file.unlock();
    read.map(|_| content)
}

/// Write to a sibling temp file, then rename it over `path` while holding
/// an exclusive lock on the target.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let cache_err =
        |step: &str, e: std::io::Error| AirtrackError::Cache(format!("{}: {}", step, e));
    let temp_path = path.with_extension("json.tmp");

    let mut temp = File::create(&temp_path).map_err(|e| cache_err("create temp file", e))?;
    temp.write_all(content)
        .and_then(|_| temp.sync_all())
        .map_err(|e| cache_err("write temp file", e))?;
    drop(temp);

    let target = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    target
        .lock_exclusive()
        .map_err(|e| cache_err("lock cache file", e))?;
    let renamed = fs::rename(&temp_path, path).map_err(|e| cache_err("replace cache file", e));
    let _ = target.unlock();
    renamed
}
