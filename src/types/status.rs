//! Air quality status bands derived from averaged particulate and CO levels

use serde::Serialize;

/// Overall status band. Each band requires all three inputs within its limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AirQualityStatus {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
}

/// (pm10, pm2_5, carbon_monoxide) upper bounds per band, best first
const BANDS: [(AirQualityStatus, f64, f64, f64); 3] = [
    (AirQualityStatus::Good, 50.0, 25.0, 4400.0),
    (AirQualityStatus::Moderate, 100.0, 50.0, 9400.0),
    (AirQualityStatus::UnhealthyForSensitiveGroups, 150.0, 75.0, 12400.0),
];

impl AirQualityStatus {
    /// Classify averaged levels. Returns `None` if any input is missing.
    pub fn classify(pm10: Option<f64>, pm25: Option<f64>, co: Option<f64>) -> Option<Self> {
        let (pm10, pm25, co) = (pm10?, pm25?, co?);
        let status = BANDS
            .iter()
            .find(|(_, max_pm10, max_pm25, max_co)| {
                pm10 <= *max_pm10 && pm25 <= *max_pm25 && co <= *max_co
            })
            .map(|(status, ..)| *status)
            .unwrap_or(Self::Unhealthy);
        Some(status)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
        }
    }

    /// Conventional indicator colour
    pub fn color(self) -> &'static str {
        match self {
            Self::Good => "green",
            Self::Moderate => "yellow",
            Self::UnhealthyForSensitiveGroups => "orange",
            Self::Unhealthy => "red",
        }
    }
}
