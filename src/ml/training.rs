//! Training data handling
//!
//! Chronological dataset split and validation metrics for held-out rows.

use super::ValidationMetrics;
use anyhow::Result;

/// Training Dataset
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingDataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    pub fn new(features: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self> {
        if features.len() != targets.len() {
            anyhow::bail!(
                "Feature and target count mismatch: {} features, {} targets",
                features.len(),
                targets.len()
            );
        }
        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Split into a leading training part and a trailing hold-out part.
    ///
    /// Rows are never shuffled. The training part keeps at least one row so
    /// a tiny dataset still yields a model; the hold-out part may be empty.
    pub fn split(&self, train_ratio: f64) -> Result<(TrainingDataset, TrainingDataset)> {
        if train_ratio <= 0.0 || train_ratio > 1.0 {
            anyhow::bail!("Train ratio must be in (0, 1], got {}", train_ratio);
        }
        if self.is_empty() {
            anyhow::bail!("Cannot split an empty dataset");
        }

        let split_idx = ((self.len() as f64 * train_ratio).floor() as usize).clamp(1, self.len());

        let train = TrainingDataset {
            features: self.features[..split_idx].to_vec(),
            targets: self.targets[..split_idx].to_vec(),
        };

        let holdout = TrainingDataset {
            features: self.features[split_idx..].to_vec(),
            targets: self.targets[split_idx..].to_vec(),
        };

        Ok((train, holdout))
    }
}

/// Calculate validation metrics
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ValidationMetrics> {
    if predictions.len() != targets.len() {
        anyhow::bail!("Prediction and target count mismatch");
    }

    if predictions.is_empty() {
        anyhow::bail!("No predictions to evaluate");
    }

    let n = predictions.len() as f64;

    let mae: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / n;

    let mse: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    // Targets at zero degrees carry no percentage error
    let pct: Vec<f64> = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(_, t)| t.abs() > 1e-10)
        .map(|(p, t)| ((p - t) / t).abs() * 100.0)
        .collect();
    let mape = if pct.is_empty() {
        0.0
    } else {
        pct.iter().sum::<f64>() / pct.len() as f64
    };

    let mean_target: f64 = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (t - p).powi(2))
        .sum();

    let r2 = if ss_tot.abs() < 1e-10 {
        0.0
    } else {
        1.0 - (ss_res / ss_tot)
    };

    Ok(ValidationMetrics::new(mae, rmse, mape, r2))
}
