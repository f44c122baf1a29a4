//! ARMA forecaster on the raw temperature series
//!
//! Stationarity and invertibility are not enforced by default: on short or
//! noisy windows the likelihood optimum often sits on or past the unit
//! circle, and rejecting it would turn an otherwise usable forecast into a
//! fit error. Turning either flag on makes such windows fail with
//! `ModelFit` instead.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, warn};

use crate::domain::ConfidenceInterval;
use crate::error::{ForecastError, ModelKind, Result};
use crate::ml::arma::{ArmaFit, ArmaOptions, ArmaOrder, ArmaParams};

/// Statistical model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalSettings {
    pub order: ArmaOrder,
    pub confidence_level: f64,
    pub min_observations: usize,
    pub enforce_stationarity: bool,
    pub enforce_invertibility: bool,
    pub max_iterations: usize,
}

impl Default for StatisticalSettings {
    fn default() -> Self {
        Self {
            order: ArmaOrder::default(),
            confidence_level: 0.95,
            min_observations: 10,
            enforce_stationarity: false,
            enforce_invertibility: false,
            max_iterations: 500,
        }
    }
}

/// Output of the statistical forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalForecast {
    pub values: Vec<f64>,
    pub intervals: Vec<ConfidenceInterval>,
    pub params: ArmaParams,
    pub log_likelihood: Option<f64>,
    /// The series was constant; the zero-noise limit was returned
    pub degenerate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StatisticalForecaster {
    pub settings: StatisticalSettings,
}

impl StatisticalForecaster {
    pub fn new(settings: StatisticalSettings) -> Self {
        Self { settings }
    }

    pub fn forecast(&self, series: &[f64], horizon: usize) -> Result<StatisticalForecast> {
        let settings = &self.settings;

        if series.len() < settings.min_observations {
            return Err(ForecastError::InsufficientData {
                needed: settings.min_observations,
                got: series.len(),
            });
        }

        let z = normal_quantile(settings.confidence_level)?;

        let options = ArmaOptions {
            enforce_stationarity: settings.enforce_stationarity,
            enforce_invertibility: settings.enforce_invertibility,
            max_iterations: settings.max_iterations,
        };
        let fit = ArmaFit::fit(series, settings.order, &options)
            .map_err(|e| ForecastError::fit(ModelKind::Statistical, format!("{:#}", e)))?;

        if fit.degenerate {
            warn!(
                observations = series.len(),
                "constant series, statistical forecast repeats the last value with zero-width intervals"
            );
        } else {
            debug!(
                ar = ?fit.params.ar,
                ma = ?fit.params.ma,
                sigma2 = fit.params.sigma2,
                aic = ?fit.aic(),
                "statistical model fitted"
            );
        }

        let mut values = Vec::with_capacity(horizon);
        let mut intervals = Vec::with_capacity(horizon);

        for (step, (mean, variance)) in fit.forecast(horizon).into_iter().enumerate() {
            // Rounding can leave a zero variance slightly negative
            let variance = if variance < 0.0 && variance > -1e-12 {
                0.0
            } else {
                variance
            };
            if !mean.is_finite() || !variance.is_finite() || variance < 0.0 {
                return Err(ForecastError::fit(
                    ModelKind::Statistical,
                    format!(
                        "invalid forecast distribution at step {} (mean {}, variance {})",
                        step + 1,
                        mean,
                        variance
                    ),
                ));
            }

            let half_width = z * variance.sqrt();
            values.push(mean);
            intervals.push(ConfidenceInterval {
                lower: mean - half_width,
                upper: mean + half_width,
            });
        }

        Ok(StatisticalForecast {
            values,
            intervals,
            params: fit.params,
            log_likelihood: fit.log_likelihood,
            degenerate: fit.degenerate,
        })
    }
}

/// Two-sided standard normal quantile for a confidence level
fn normal_quantile(level: f64) -> Result<f64> {
    if !(level > 0.0 && level < 1.0) {
        return Err(ForecastError::InvalidConfig(format!(
            "confidence level must be in (0, 1), got {}",
            level
        )));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ForecastError::InvalidConfig(format!("standard normal: {}", e)))?;
    Ok(normal.inverse_cdf((1.0 + level) / 2.0))
}
