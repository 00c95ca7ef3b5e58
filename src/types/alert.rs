//! Threshold alert types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AirtrackError, Reading, Result};

/// Comparison applied between a metric value and a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[default]
    GreaterThan,
}

impl Comparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
        }
    }
}

/// A single threshold rule on one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub metric: String,
    #[serde(default)]
    pub comparison: Comparison,
    pub threshold: f64,
}

impl AlertRule {
    pub fn greater_than(metric: impl Into<String>, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            comparison: Comparison::GreaterThan,
            threshold,
        }
    }

    /// Whether `reading` triggers this rule. Missing or null values never do.
    pub fn triggers(&self, reading: &Reading) -> bool {
        reading
            .value(&self.metric)
            .is_some_and(|v| self.comparison.holds(v, self.threshold))
    }

    /// Default thresholds: PM2.5 > 100, PM10 > 150, CO > 10, NO2 > 80
    pub fn presets() -> Vec<AlertRule> {
        vec![
            Self::greater_than("pm2_5", 100.0),
            Self::greater_than("pm10", 150.0),
            Self::greater_than("carbon_monoxide", 10.0),
            Self::greater_than("nitrogen_dioxide", 80.0),
        ]
    }
}

impl FromStr for AlertRule {
    type Err = AirtrackError;

    /// Parses `"metric>threshold"`, e.g. `"pm2_5>100"`.
    fn from_str(s: &str) -> Result<Self> {
        let (metric, threshold) = s
            .split_once('>')
            .ok_or_else(|| AirtrackError::InvalidRule(format!("expected metric>value: '{}'", s)))?;

        let metric = metric.trim();
        if metric.is_empty() {
            return Err(AirtrackError::InvalidRule(format!("missing metric: '{}'", s)));
        }

        let threshold: f64 = threshold
            .trim()
            .parse()
            .map_err(|_| AirtrackError::InvalidRule(format!("invalid threshold: '{}'", s)))?;
        if !threshold.is_finite() {
            return Err(AirtrackError::InvalidRule(format!(
                "threshold must be finite: '{}'",
                s
            )));
        }

        Ok(Self::greater_than(metric, threshold))
    }
}

impl fmt::Display for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.metric,
            self.comparison.symbol(),
            self.threshold
        )
    }
}

/// Evaluation outcome for one record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertResult<'a> {
    pub record: &'a Reading,
    pub flagged: bool,
    /// Metrics whose rules fired, in rule order
    pub triggered: Vec<String>,
}
