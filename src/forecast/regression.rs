//! Lag-feature random forest with iterative multi-step projection

use std::collections::VecDeque;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::features::LagTable;
use crate::error::{ForecastError, ModelKind, Result};
use crate::ml::smartcore::{ForestParams, SmartcoreRandomForest};
use crate::ml::training::calculate_metrics;
use crate::ml::{MLModel, ValidationMetrics};

/// Output of the regression forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionForecast {
    pub values: Vec<f64>,
    pub training_rows: usize,
    /// Metrics on the held-out tail; `None` when the tail is empty
    pub holdout: Option<ValidationMetrics>,
}

/// Fits a random forest on a lag table and projects it forward
#[derive(Debug, Clone)]
pub struct RegressionForecaster {
    pub train_ratio: f64,
    pub forest: ForestParams,
}

impl Default for RegressionForecaster {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            forest: ForestParams::default(),
        }
    }
}

impl RegressionForecaster {
    pub fn new(train_ratio: f64, forest: ForestParams) -> Self {
        Self {
            train_ratio,
            forest,
        }
    }

    pub fn forecast(&self, table: &LagTable, horizon: usize) -> Result<RegressionForecast> {
        self.run(table, horizon)
            .map_err(|e| ForecastError::fit(ModelKind::Regression, format!("{:#}", e)))
    }

    fn run(&self, table: &LagTable, horizon: usize) -> anyhow::Result<RegressionForecast> {
        let (train, holdout) = table.to_dataset().split(self.train_ratio)?;

        let model = SmartcoreRandomForest::train(&train.features, &train.targets, &self.forest)
            .context("random forest fit")?;

        let holdout_metrics = if holdout.is_empty() {
            None
        } else {
            let predictions = model.predict_batch(&holdout.features)?;
            Some(calculate_metrics(&predictions, &holdout.targets)?)
        };

        if let Some(m) = &holdout_metrics {
            info!(
                train_rows = train.len(),
                holdout_rows = holdout.len(),
                mae = m.mae,
                rmse = m.rmse,
                r2 = m.r2,
                "random forest hold-out evaluation"
            );
        } else {
            debug!(train_rows = train.len(), "no hold-out rows for random forest");
        }

        let values = project_iteratively(&model, table.seed(), horizon)?;

        Ok(RegressionForecast {
            values,
            training_rows: train.len(),
            holdout: holdout_metrics,
        })
    }
}

/// Recursive multi-step forecast.
///
/// `seed` holds the latest actual values, most recent first. After each step
/// the oldest lag is dropped and the prediction becomes lag 1, so from the
/// second step on the model consumes its own output.
pub fn project_iteratively(
    model: &dyn MLModel,
    seed: &[f64],
    horizon: usize,
) -> anyhow::Result<Vec<f64>> {
    if seed.len() != model.n_features() {
        anyhow::bail!(
            "seed has {} lags but the model expects {}",
            seed.len(),
            model.n_features()
        );
    }

    let mut buffer: VecDeque<f64> = seed.iter().copied().collect();
    let mut predictions = Vec::with_capacity(horizon);

    for step in 1..=horizon {
        let next = model.predict(buffer.make_contiguous())?;
        if !next.is_finite() {
            anyhow::bail!("non-finite prediction at step {}", step);
        }
        predictions.push(next);

        buffer.pop_back();
        buffer.push_front(next);
    }

    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, SeriesWindow};
    use crate::forecast::features::build_lag_table;
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;

    /// Predicts `features[index] + offset`
    struct PickLag {
        width: usize,
        index: usize,
        offset: f64,
    }

    impl MLModel for PickLag {
        fn predict(&self, features: &[f64]) -> anyhow::Result<f64> {
            Ok(features[self.index] + self.offset)
        }

        fn n_features(&self) -> usize {
            self.width
        }
    }

    struct AlwaysNan;

    impl MLModel for AlwaysNan {
        fn predict(&self, _features: &[f64]) -> anyhow::Result<f64> {
            Ok(f64::NAN)
        }

        fn n_features(&self) -> usize {
            2
        }
    }

    fn window(values: &[f64]) -> SeriesWindow {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        SeriesWindow::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| Observation::new(start + Duration::hours(i as i64), *v, 55.0))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_predictions_feed_back_as_lag_one() {
        let model = PickLag {
            width: 3,
            index: 0,
            offset: 1.0,
        };
        let out = project_iteratively(&model, &[3.0, 2.0, 1.0], 4).unwrap();
        assert_eq!(out, vec![4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_oldest_lag_is_dropped_each_step() {
        // Echoing the oldest lag walks back through the seed, then wraps
        // around onto the first prediction.
        let model = PickLag {
            width: 3,
            index: 2,
            offset: 0.0,
        };
        let out = project_iteratively(&model, &[3.0, 2.0, 1.0], 4).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 1.0]);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(7)]
    #[case(48)]
    fn test_projection_length_matches_horizon(#[case] horizon: usize) {
        let model = PickLag {
            width: 2,
            index: 1,
            offset: 0.5,
        };
        let out = project_iteratively(&model, &[1.0, 2.0], horizon).unwrap();
        assert_eq!(out.len(), horizon);
    }

    #[test]
    fn test_seed_width_mismatch() {
        let model = PickLag {
            width: 3,
            index: 0,
            offset: 0.0,
        };
        assert!(project_iteratively(&model, &[1.0, 2.0], 2).is_err());
    }

    #[test]
    fn test_non_finite_prediction_is_an_error() {
        assert!(project_iteratively(&AlwaysNan, &[1.0, 2.0], 3).is_err());
        // zero steps never call the model
        assert!(project_iteratively(&AlwaysNan, &[1.0, 2.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_linear_trend_is_tracked() {
        let values: Vec<f64> = (0..240).map(|i| 20.0 + 0.01 * i as f64).collect();
        let table = build_lag_table(&window(&values), 24).unwrap();

        let result = RegressionForecaster::default().forecast(&table, 7).unwrap();

        assert_eq!(result.values.len(), 7);
        assert_eq!(result.training_rows, 172);
        assert!(result.holdout.is_some());
        for pair in result.values.windows(2) {
            assert!(pair[1] >= pair[0] - 0.05, "{:?}", result.values);
        }
        for v in &result.values {
            assert!(*v > 21.0 && *v < 22.5, "{:?}", result.values);
        }
    }

    #[test]
    fn test_forest_forecast_is_deterministic() {
        let values: Vec<f64> = (0..120)
            .map(|i| 15.0 + 5.0 * (i as f64 * std::f64::consts::PI / 12.0).sin())
            .collect();
        let table = build_lag_table(&window(&values), 24).unwrap();
        let forecaster = RegressionForecaster::default();

        let a = forecaster.forecast(&table, 7).unwrap();
        let b = forecaster.forecast(&table, 7).unwrap();
        assert_eq!(a.values, b.values);
    }

    #[test]
    fn test_single_row_table_still_fits() {
        let values: Vec<f64> = (0..25).map(|i| 10.0 + i as f64 * 0.1).collect();
        let table = build_lag_table(&window(&values), 24).unwrap();
        assert_eq!(table.len(), 1);

        let result = RegressionForecaster::default().forecast(&table, 7).unwrap();
        assert_eq!(result.values.len(), 7);
        assert_eq!(result.training_rows, 1);
        assert!(result.holdout.is_none());
        assert!(result.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_horizon_is_empty() {
        let values: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let table = build_lag_table(&window(&values), 24).unwrap();
        let result = RegressionForecaster::default().forecast(&table, 0).unwrap();
        assert!(result.values.is_empty());
    }

    #[test]
    fn test_bad_train_ratio_is_a_regression_fit_error() {
        let values: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let table = build_lag_table(&window(&values), 24).unwrap();
        let forecaster = RegressionForecaster::new(0.0, ForestParams::default());

        let err = forecaster.forecast(&table, 3).unwrap_err();
        assert_eq!(err.model(), Some(ModelKind::Regression));
    }
}
