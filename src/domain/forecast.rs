use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelKind;
use crate::ml::{ArmaParams, ValidationMetrics};

/// Forecast confidence interval bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// One future time step with every model's view of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastStep {
    pub timestamp: DateTime<Utc>,
    pub regression: Option<f64>,
    pub statistical: Option<f64>,
    pub interval: Option<ConfidenceInterval>,
}

/// A model that did not produce a forecast, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: ModelKind,
    pub message: String,
}

/// Both model outputs aligned on a shared future time index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedForecast {
    pub last_observed: DateTime<Utc>,
    pub sampling_interval_secs: i64,
    pub steps: Vec<ForecastStep>,
    pub failures: Vec<ModelFailure>,
}

impl AlignedForecast {
    pub fn horizon(&self) -> usize {
        self.steps.len()
    }

    /// True when every model produced a forecast
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn regression_values(&self) -> Option<Vec<f64>> {
        self.steps.iter().map(|s| s.regression).collect()
    }

    pub fn statistical_values(&self) -> Option<Vec<f64>> {
        self.steps.iter().map(|s| s.statistical).collect()
    }

    pub fn intervals(&self) -> Option<Vec<ConfidenceInterval>> {
        self.steps.iter().map(|s| s.interval).collect()
    }

    pub fn failure(&self, model: ModelKind) -> Option<&ModelFailure> {
        self.failures.iter().find(|f| f.model == model)
    }
}

/// Fit diagnostics carried alongside the forecast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDiagnostics {
    /// Held-out tail metrics of the regression model, when a tail exists
    pub regression_holdout: Option<ValidationMetrics>,
    pub regression_training_rows: Option<usize>,
    pub statistical_params: Option<ArmaParams>,
    pub statistical_log_likelihood: Option<f64>,
    pub statistical_degenerate: bool,
}

/// Everything a forecast request produces for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub city: String,
    pub generated_at: DateTime<Utc>,
    pub window_observations: usize,
    pub confidence_level: f64,
    pub forecast: AlignedForecast,
    pub diagnostics: ModelDiagnostics,
}
