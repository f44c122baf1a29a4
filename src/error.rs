use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which forecasting strategy produced a result or an error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Regression,
    Statistical,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regression => write!(f, "regression"),
            Self::Statistical => write!(f, "statistical"),
        }
    }
}

/// Errors raised by the forecasting core
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("no observations found for {city} in the last {days} days")]
    EmptyWindow { city: String, days: u32 },

    #[error("insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("{model} model fit failed: {reason}")]
    ModelFit { model: ModelKind, reason: String },

    #[error("invalid series window: {0}")]
    InvalidWindow(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{model} forecast has {got} values, expected {expected}")]
    Misaligned {
        model: ModelKind,
        expected: usize,
        got: usize,
    },

    #[error("all models failed (regression: {regression}; statistical: {statistical})")]
    AllModelsFailed {
        regression: Box<ForecastError>,
        statistical: Box<ForecastError>,
    },

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

impl ForecastError {
    pub fn fit(model: ModelKind, reason: impl Into<String>) -> Self {
        Self::ModelFit {
            model,
            reason: reason.into(),
        }
    }

    /// The model this error is attributed to, if any
    pub fn model(&self) -> Option<ModelKind> {
        match self {
            Self::ModelFit { model, .. } | Self::Misaligned { model, .. } => Some(*model),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ForecastError::InsufficientData { needed: 25, got: 5 };
        assert_eq!(
            error.to_string(),
            "insufficient data: need at least 25 observations, got 5"
        );

        let error = ForecastError::fit(ModelKind::Statistical, "likelihood is NaN");
        assert_eq!(
            error.to_string(),
            "statistical model fit failed: likelihood is NaN"
        );
    }

    #[test]
    fn test_error_model_attribution() {
        assert_eq!(
            ForecastError::fit(ModelKind::Regression, "x").model(),
            Some(ModelKind::Regression)
        );
        assert_eq!(
            ForecastError::InsufficientData { needed: 2, got: 1 }.model(),
            None
        );
    }

    #[test]
    fn test_provider_error_is_transparent() {
        let error: ForecastError = anyhow::anyhow!("connection refused").into();
        assert_eq!(error.to_string(), "connection refused");
    }
}
