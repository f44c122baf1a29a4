//! SmartCore ML Model Wrapper
//!
//! This module provides a wrapper for SmartCore's RandomForestRegressor
//! used as the lag-feature temperature regressor.

use super::MLModel;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

/// Random forest training parameters
///
/// Defaults follow the usual bagged-regressor setup: 100 fully grown trees,
/// every feature considered at each split, fixed seed for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub seed: u64,
    pub max_depth: Option<u16>,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            max_depth: None,
            min_samples_leaf: 1,
            min_samples_split: 2,
        }
    }
}

impl ForestParams {
    fn to_parameters(&self, n_features: usize) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_samples_split: self.min_samples_split,
            n_trees: self.n_trees,
            m: Some(n_features),
            keep_samples: false, // Don't store training samples (saves memory)
            seed: self.seed,
        }
    }
}

/// SmartCore RandomForest Model Wrapper
#[derive(Debug)]
pub struct SmartcoreRandomForest {
    model: RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
    n_features: usize,
    pub training_samples: usize,
}

impl SmartcoreRandomForest {
    /// Train a new RandomForest model
    pub fn train(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<Self> {
        if x.is_empty() || y.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }

        if x.len() != y.len() {
            anyhow::bail!(
                "Feature and target count mismatch: {} features, {} targets",
                x.len(),
                y.len()
            );
        }

        if params.n_trees == 0 {
            anyhow::bail!("Random forest needs at least one tree");
        }

        let n_samples = x.len();
        let n_features = x[0].len();
        let x_matrix = to_matrix(x, n_features)?;

        let model = RandomForestRegressor::fit(&x_matrix, &y.to_vec(), params.to_parameters(n_features))
            .map_err(|e| anyhow::anyhow!("RandomForest training failed: {:?}", e))?;

        Ok(Self {
            model,
            n_features,
            training_samples: n_samples,
        })
    }

    /// Predict a batch of rows at once
    pub fn predict_batch(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if x.is_empty() {
            return Ok(Vec::new());
        }

        let x_matrix = to_matrix(x, self.n_features)?;
        self.model
            .predict(&x_matrix)
            .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))
    }
}

impl MLModel for SmartcoreRandomForest {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.n_features {
            anyhow::bail!(
                "Feature count mismatch: expected {}, got {}",
                self.n_features,
                features.len()
            );
        }

        // 1 row, n features
        let x = DenseMatrix::new(1, self.n_features, features.to_vec(), false);

        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))?;

        predictions
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Model returned empty predictions"))
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

fn to_matrix(x: &[Vec<f64>], n_features: usize) -> Result<DenseMatrix<f64>> {
    let mut flat_data = Vec::with_capacity(x.len() * n_features);
    for row in x {
        if row.len() != n_features {
            anyhow::bail!("All feature vectors must have the same length");
        }
        flat_data.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(x.len(), n_features, flat_data, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y = 2x1 + 3x2
        let x: Vec<Vec<f64>> = vec![
            vec![1.0, 1.0],
            vec![2.0, 1.0],
            vec![1.0, 2.0],
            vec![2.0, 2.0],
            vec![3.0, 3.0],
            vec![4.0, 2.0],
            vec![2.0, 4.0],
            vec![3.0, 1.0],
            vec![1.0, 3.0],
            vec![4.0, 4.0],
        ];
        let y = x.iter().map(|r| 2.0 * r[0] + 3.0 * r[1]).collect();
        (x, y)
    }

    #[test]
    fn test_default_parameters() {
        let params = ForestParams::default();
        assert_eq!(params.n_trees, 100);
        assert_eq!(params.seed, 42);
        assert_eq!(params.max_depth, None);

        let sc = params.to_parameters(24);
        assert_eq!(sc.m, Some(24));
        assert!(!sc.keep_samples);
    }

    #[test]
    fn test_train_random_forest() {
        let (x, y) = linear_data();
        let params = ForestParams {
            n_trees: 10,
            ..ForestParams::default()
        };

        let model = SmartcoreRandomForest::train(&x, &y, &params).unwrap();
        assert_eq!(model.training_samples, 10);
        assert_eq!(model.n_features(), 2);

        let pred = model.predict(&[3.0, 3.0]).unwrap();
        assert!(pred > 8.0 && pred < 20.0);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (x, y) = linear_data();
        let params = ForestParams::default();

        let a = SmartcoreRandomForest::train(&x, &y, &params).unwrap();
        let b = SmartcoreRandomForest::train(&x, &y, &params).unwrap();

        assert_eq!(
            a.predict_batch(&x).unwrap(),
            b.predict_batch(&x).unwrap()
        );
    }

    #[test]
    fn test_rejects_wrong_feature_width() {
        let (x, y) = linear_data();
        let model = SmartcoreRandomForest::train(&x, &y, &ForestParams::default()).unwrap();
        assert!(model.predict(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_rejects_empty_dataset() {
        assert!(SmartcoreRandomForest::train(&[], &[], &ForestParams::default()).is_err());
    }
}
