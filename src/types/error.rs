use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// airtrack error types
#[derive(Error, Debug)]
pub enum AirtrackError {
    /// Requested metric never observed in the input
    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    /// Reading falls in a month outside the configured window
    #[error("unknown month: {month} (location {location}) is not in the configured month order")]
    UnknownMonth { location: String, month: String },

    /// Empty or malformed alert rule set
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Nothing to aggregate
    #[error("no data: {0}")]
    NoData(String),

    /// Pivot input spans more than one location
    #[error("metric {metric} spans multiple locations: {}", locations.join(", "))]
    MixedLocations {
        metric: String,
        locations: Vec<String>,
    },

    /// Failed to parse input
    #[error("parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache operation failed
    #[error("cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for airtrack
pub type Result<T> = std::result::Result<T, AirtrackError>;

/// Why a single location could not be loaded
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LoadFailureKind {
    /// The source was missing or unreadable
    #[error("{0}")]
    Source(String),

    /// The source did not finish within its budget
    #[error("timed out after {0:?}")]
    Timeout(#[serde(serialize_with = "serialize_duration_secs")] Duration),
}

fn serialize_duration_secs<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Per-location load failure. Reported alongside combined data, never raised.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("location {location}: {kind}")]
pub struct LoadFailure {
    pub location: String,
    pub kind: LoadFailureKind,
}

impl LoadFailure {
    pub fn unavailable(location: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            location: location.into(),
            kind: LoadFailureKind::Source(reason.to_string()),
        }
    }

    pub fn timeout(location: impl Into<String>, after: Duration) -> Self {
        Self {
            location: location.into(),
            kind: LoadFailureKind::Timeout(after),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, LoadFailureKind::Timeout(_))
    }
}
