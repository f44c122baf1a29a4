//! ML Model Definitions

use anyhow::Result;

/// A fitted single-output regressor over a fixed-width feature vector
pub trait MLModel: Send + Sync {
    /// Predict one value from one feature row
    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Width of the feature row the model was trained on
    fn n_features(&self) -> usize;
}
