//! Machine Learning Module
//!
//! Model fitting used by the forecasters:
//! - Random forest regression on lag features (SmartCore)
//! - ARMA estimation by Kalman-filter likelihood
//! - Chronological train/hold-out split and validation metrics

use serde::{Deserialize, Serialize};

pub mod arma;
pub mod models;
pub mod optimization;
pub mod smartcore;
pub mod training;

pub use arma::{ArmaFit, ArmaOrder, ArmaParams};
pub use models::MLModel;

/// Validation Metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub mape: f64, // Mean Absolute Percentage Error
    pub r2: f64,   // R-squared
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, mape: f64, r2: f64) -> Self {
        Self {
            mae,
            rmse,
            mape,
            r2,
        }
    }
}
