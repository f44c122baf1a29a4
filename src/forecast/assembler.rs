//! Aligns model outputs on the future time index

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::regression::RegressionForecast;
use super::statistical::StatisticalForecast;
use crate::domain::{AlignedForecast, ConfidenceInterval, ForecastStep, ModelFailure};
use crate::error::{ForecastError, ModelKind, Result};

/// Future timestamps `last_observed + (i + 1) * interval` for `i < horizon`.
///
/// A horizon or interval that runs past the representable time range is
/// `InvalidConfig`.
pub fn future_index(
    last_observed: DateTime<Utc>,
    interval: Duration,
    horizon: usize,
) -> Result<Vec<DateTime<Utc>>> {
    let out_of_range = || {
        ForecastError::InvalidConfig(format!(
            "horizon of {} steps of {}s runs past the supported time range",
            horizon,
            interval.num_seconds()
        ))
    };

    let steps = i32::try_from(horizon).map_err(|_| out_of_range())?;
    (1..=steps)
        .map(|i| {
            interval
                .checked_mul(i)
                .and_then(|offset| last_observed.checked_add_signed(offset))
                .ok_or_else(out_of_range)
        })
        .collect()
}

/// Combine both model outcomes into one aligned forecast.
///
/// A failed model leaves its column empty and is listed in `failures`.
/// Only when both failed is the result an error.
pub fn assemble(
    last_observed: DateTime<Utc>,
    interval: Duration,
    horizon: usize,
    regression: Result<RegressionForecast>,
    statistical: Result<StatisticalForecast>,
) -> Result<AlignedForecast> {
    if interval <= Duration::zero() {
        return Err(ForecastError::InvalidConfig(format!(
            "sampling interval must be positive, got {}s",
            interval.num_seconds()
        )));
    }

    let (regression, statistical) = match (regression, statistical) {
        (Err(r), Err(s)) => {
            return Err(ForecastError::AllModelsFailed {
                regression: Box::new(r),
                statistical: Box::new(s),
            })
        }
        pair => pair,
    };

    let mut failures = Vec::new();

    let regression_values = match regression {
        Ok(forecast) => {
            check_length(ModelKind::Regression, horizon, forecast.values.len())?;
            Some(forecast.values)
        }
        Err(e) => {
            warn!(error = %e, "regression forecast unavailable");
            failures.push(ModelFailure {
                model: ModelKind::Regression,
                message: e.to_string(),
            });
            None
        }
    };

    let statistical_values: Option<(Vec<f64>, Vec<ConfidenceInterval>)> = match statistical {
        Ok(forecast) => {
            check_length(ModelKind::Statistical, horizon, forecast.values.len())?;
            check_length(ModelKind::Statistical, horizon, forecast.intervals.len())?;
            Some((forecast.values, forecast.intervals))
        }
        Err(e) => {
            warn!(error = %e, "statistical forecast unavailable");
            failures.push(ModelFailure {
                model: ModelKind::Statistical,
                message: e.to_string(),
            });
            None
        }
    };

    let steps = future_index(last_observed, interval, horizon)?
        .into_iter()
        .enumerate()
        .map(|(i, timestamp)| ForecastStep {
            timestamp,
            regression: regression_values.as_ref().map(|v| v[i]),
            statistical: statistical_values.as_ref().map(|(v, _)| v[i]),
            interval: statistical_values.as_ref().map(|(_, ci)| ci[i]),
        })
        .collect();

    Ok(AlignedForecast {
        last_observed,
        sampling_interval_secs: interval.num_seconds(),
        steps,
        failures,
    })
}

fn check_length(model: ModelKind, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ForecastError::Misaligned {
            model,
            expected,
            got,
        });
    }
    Ok(())
}
