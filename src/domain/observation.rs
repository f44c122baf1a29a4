use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// A single timestamped weather observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, temperature_c: f64, humidity: f64) -> Self {
        Self {
            timestamp,
            temperature_c,
            humidity,
        }
    }
}

/// Full stored weather row, as acquired from the weather provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    pub country: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity: f64,
    pub pressure_hpa: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub weather_main: Option<String>,
    pub weather_description: Option<String>,
    /// Provider payload exactly as received
    #[serde(default)]
    pub raw_json: serde_json::Value,
}

impl WeatherRecord {
    pub fn observation(&self) -> Observation {
        Observation::new(self.observed_at, self.temperature_c, self.humidity)
    }
}

/// Chronologically ordered, non-empty slice of observations for one city.
///
/// Timestamps are strictly increasing and every measurement is finite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesWindow {
    observations: Vec<Observation>,
}

impl SeriesWindow {
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        if observations.is_empty() {
            return Err(ForecastError::InvalidWindow(
                "window contains no observations".to_string(),
            ));
        }

        for pair in observations.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(ForecastError::InvalidWindow(format!(
                    "timestamps must be strictly increasing ({} is followed by {})",
                    pair[0].timestamp, pair[1].timestamp
                )));
            }
        }

        if let Some(bad) = observations
            .iter()
            .find(|o| !o.temperature_c.is_finite() || !o.humidity.is_finite())
        {
            return Err(ForecastError::InvalidWindow(format!(
                "non-finite measurement at {}",
                bad.timestamp
            )));
        }

        Ok(Self { observations })
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn temperatures(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.temperature_c).collect()
    }

    pub fn humidities(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.humidity).collect()
    }

    pub fn first_timestamp(&self) -> DateTime<Utc> {
        self.observations[0].timestamp
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.observations[self.observations.len() - 1].timestamp
    }

    /// Native sampling interval: the median spacing between consecutive
    /// observations, or `fallback` for a single-observation window.
    pub fn sampling_interval(&self, fallback: Duration) -> Duration {
        let mut gaps: Vec<Duration> = self
            .observations
            .windows(2)
            .map(|pair| pair[1].timestamp - pair[0].timestamp)
            .collect();

        if gaps.is_empty() {
            return fallback;
        }

        gaps.sort();
        gaps[gaps.len() / 2]
    }
}
