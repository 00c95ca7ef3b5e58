//! JSON Lines reading source
//!
//! One object per line: a `time` field plus one numeric (or null) field per metric.
//! ```text
//! {"time":"2024-09-02T10:00","pm10":21.4,"pm2_5":null,"uv_index":3.1}
//! ```

use crate::types::{AirtrackError, Reading, Result, TimeReference};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::LocationSource;

/// Keys that never hold a metric
const TIME_KEYS: [&str; 2] = ["time", "timestamp"];
const IGNORED_KEYS: [&str; 2] = ["location", "city"];

/// Wall-clock formats accepted when the timestamp carries no offset
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Reads one location's readings from a `.jsonl` file
pub struct JsonlSource {
    location: String,
    path: PathBuf,
    time_ref: TimeReference,
}

impl JsonlSource {
    /// Offset-less timestamps are interpreted in `time_ref`
    pub fn new(location: impl Into<String>, path: impl Into<PathBuf>, time_ref: TimeReference) -> Self {
        Self {
            location: location.into(),
            path: path.into(),
            time_ref,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_line(&self, line: &str) -> Result<Reading> {
        let object: Map<String, Value> =
            serde_json::from_str(line).map_err(|e| AirtrackError::Parse(e.to_string()))?;

        let raw_time = TIME_KEYS
            .iter()
            .find_map(|k| object.get(*k).and_then(Value::as_str))
            .ok_or_else(|| AirtrackError::Parse("missing time field".into()))?;
        let timestamp = parse_timestamp(raw_time, self.time_ref)?;

        let metrics: BTreeMap<String, Option<f64>> = object
            .iter()
            .filter(|(k, _)| !TIME_KEYS.contains(&k.as_str()) && !IGNORED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), coerce_number(v)))
            .collect();

        Ok(Reading {
            location: self.location.clone(),
            timestamp,
            metrics,
        })
    }
}

impl LocationSource for JsonlSource {
    fn location(&self) -> &str {
        &self.location
    }

    fn load(&self) -> Result<Vec<Reading>> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut readings = Vec::new();
        let mut skipped = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_line(&line) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    skipped += 1;
                    warn!(location = %self.location, line = idx + 1, error = %e, "skipping malformed line");
                }
            }
        }

        if readings.is_empty() && skipped > 0 {
            return Err(AirtrackError::Parse(format!(
                "{}: no valid readings ({} malformed lines)",
                self.path.display(),
                skipped
            )));
        }

        debug!(location = %self.location, count = readings.len(), skipped, "loaded readings");
        Ok(readings)
    }
}

/// RFC 3339 timestamps keep their offset; naive ones are localized in `time_ref`
fn parse_timestamp(raw: &str, time_ref: TimeReference) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| time_ref.localize(naive))
        .ok_or_else(|| AirtrackError::Parse(format!("invalid timestamp '{}'", raw)))
}

/// Numbers and numeric strings become values; anything else is missing
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
