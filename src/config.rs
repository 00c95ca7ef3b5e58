//! Runtime configuration
//!
//! Loaded from a JSON file (`--config` or `~/.airtrack/config.json`). Every
//! field is optional; anything left out falls back to the built-in defaults.

use crate::services::combiner::LoadOptions;
use crate::types::{AirtrackError, AlertRule, Reducer, Result, TimeReference};
use chrono::Month;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DEFAULT_METRICS: [&str; 8] = [
    "pm10",
    "pm2_5",
    "carbon_monoxide",
    "carbon_dioxide",
    "nitrogen_dioxide",
    "sulphur_dioxide",
    "dust",
    "uv_index",
];

const DEFAULT_MONTHS: [&str; 4] = ["September", "October", "November", "December"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metrics to aggregate, in output order
    pub metrics: Vec<String>,
    /// Month order for monthly reports; readings outside it are an error
    pub months: Vec<String>,
    pub reducer: Reducer,
    pub rules: Vec<AlertRule>,
    /// `"utc"` or a fixed offset like `"+05:30"`
    pub time_reference: String,
    /// Directory holding one `<location>.jsonl` per location
    pub data_dir: Option<PathBuf>,
    /// Explicit location list; empty means every file in `data_dir`
    pub locations: Vec<String>,
    pub max_concurrency: Option<usize>,
    pub load_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics: DEFAULT_METRICS.iter().map(|m| m.to_string()).collect(),
            months: DEFAULT_MONTHS.iter().map(|m| m.to_string()).collect(),
            reducer: Reducer::default(),
            rules: AlertRule::presets(),
            time_reference: TimeReference::Utc.to_string(),
            data_dir: None,
            locations: Vec::new(),
            max_concurrency: None,
            load_timeout_secs: 30,
        }
    }
}

impl Config {
    /// `~/.airtrack/config.json`
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(".airtrack").join("config.json"))
    }

    /// Load from `path`, or from the default location when `None`.
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load_from_file(&path)?,
                None => {
                    debug!("no config file, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AirtrackError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            AirtrackError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metrics.is_empty() {
            return Err(AirtrackError::InvalidMetric("no metrics configured".into()));
        }
        self.month_order()?;
        self.time_ref()?;
        if self.load_timeout_secs == 0 {
            return Err(AirtrackError::Config("load_timeout_secs must be positive".into()));
        }
        if self.max_concurrency == Some(0) {
            return Err(AirtrackError::Config("max_concurrency must be positive".into()));
        }
        Ok(())
    }

    /// Parsed month order; must be non-empty and free of duplicates
    pub fn month_order(&self) -> Result<Vec<Month>> {
        if self.months.is_empty() {
            return Err(AirtrackError::Config("month order is empty".into()));
        }

        let mut seen = BTreeSet::new();
        self.months
            .iter()
            .map(|name| {
                let month: Month = name
                    .trim()
                    .parse()
                    .map_err(|_| AirtrackError::Config(format!("unknown month '{}'", name)))?;
                if !seen.insert(month.number_from_month()) {
                    return Err(AirtrackError::Config(format!(
                        "month '{}' listed twice",
                        name
                    )));
                }
                Ok(month)
            })
            .collect()
    }

    pub fn time_ref(&self) -> Result<TimeReference> {
        self.time_reference.parse()
    }

    pub fn load_options(&self) -> LoadOptions {
        let defaults = LoadOptions::default();
        LoadOptions {
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            timeout: Duration::from_secs(self.load_timeout_secs),
        }
    }
}
