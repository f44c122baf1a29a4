//! Feature engineering for forecasting models
//!
//! Turns an observation window into a supervised lag table: every row holds
//! the `L` preceding temperatures (lag 1 first) and the temperature to predict.

use chrono::{DateTime, Utc};

use crate::domain::SeriesWindow;
use crate::error::{ForecastError, Result};
use crate::ml::training::TrainingDataset;

/// Supervised-learning view of a series window
#[derive(Debug, Clone, PartialEq)]
pub struct LagTable {
    lags: usize,
    /// `rows[i][k - 1]` is the target `k` steps before `targets[i]`
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
    /// Last `lags` observed values, most recent first
    seed: Vec<f64>,
}

impl LagTable {
    pub fn lags(&self) -> usize {
        self.lags
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Timestamp of each row's target
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Feature vector for the first step past the window
    pub fn seed(&self) -> &[f64] {
        &self.seed
    }

    pub fn feature_names(&self) -> Vec<String> {
        (1..=self.lags).map(|k| format!("lag_{}", k)).collect()
    }

    pub fn to_dataset(&self) -> TrainingDataset {
        TrainingDataset {
            features: self.rows.clone(),
            targets: self.targets.clone(),
        }
    }
}

/// Create lag features for time series (previous values)
pub fn create_lag_features(values: &[f64], num_lags: usize) -> Vec<Vec<f64>> {
    let mut lag_features = Vec::with_capacity(values.len().saturating_sub(num_lags));

    for i in num_lags..values.len() {
        let mut lags = Vec::with_capacity(num_lags);
        for lag in 1..=num_lags {
            lags.push(values[i - lag]);
        }
        lag_features.push(lags);
    }

    lag_features
}

/// Build the lag table of window temperatures.
///
/// The first `lags` observations only serve as history, so a window of `N`
/// observations yields `N - lags` rows.
pub fn build_lag_table(window: &SeriesWindow, lags: usize) -> Result<LagTable> {
    if lags == 0 {
        return Err(ForecastError::InvalidConfig(
            "lag depth must be at least 1".to_string(),
        ));
    }
    if window.len() <= lags {
        return Err(ForecastError::InsufficientData {
            needed: lags + 1,
            got: window.len(),
        });
    }

    let values = window.temperatures();
    let rows = create_lag_features(&values, lags);
    let targets = values[lags..].to_vec();
    let timestamps = window.observations()[lags..]
        .iter()
        .map(|o| o.timestamp)
        .collect();
    let seed = values.iter().rev().take(lags).copied().collect();

    Ok(LagTable {
        lags,
        rows,
        targets,
        timestamps,
        seed,
    })
}
