use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::task::JoinError;
use tracing::{info, instrument};

use super::assembler::assemble;
use super::features::build_lag_table;
use super::regression::{RegressionForecast, RegressionForecaster};
use super::statistical::{StatisticalForecast, StatisticalForecaster};
use crate::config::ForecastConfig;
use crate::domain::{ForecastReport, ModelDiagnostics, SeriesWindow};
use crate::error::{ForecastError, ModelKind, Result};
use crate::repo::SeriesWindowProvider;

/// Retrieval → features → both fits → assembly, for one city at a time
pub struct ForecastEngine {
    provider: Arc<dyn SeriesWindowProvider>,
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(provider: Arc<dyn SeriesWindowProvider>, config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    /// Forecast `city` from its configured look-back window
    pub async fn forecast_city(&self, city: &str) -> Result<ForecastReport> {
        let window = self.load_window(city, self.config.days).await?;
        self.forecast_window(city, &window).await
    }

    /// Fetch the last `days` days for `city`. No observations is `EmptyWindow`.
    pub async fn load_window(&self, city: &str, days: u32) -> Result<SeriesWindow> {
        let observations = self.provider.last_n_days(city, days).await?;
        if observations.is_empty() {
            return Err(ForecastError::EmptyWindow {
                city: city.to_string(),
                days,
            });
        }
        info!(city, days, observations = observations.len(), "observation window loaded");
        SeriesWindow::new(observations)
    }

    #[instrument(skip(self, window), fields(observations = window.len()))]
    pub async fn forecast_window(&self, city: &str, window: &SeriesWindow) -> Result<ForecastReport> {
        let cfg = &self.config;
        let horizon = cfg.horizon;

        // Neither model runs when the lag table cannot be built
        let table = build_lag_table(window, cfg.lags)?;

        let regression = RegressionForecaster::new(cfg.train_ratio, cfg.forest.clone());
        let regression_task =
            tokio::task::spawn_blocking(move || regression.forecast(&table, horizon));

        let statistical = StatisticalForecaster::new(cfg.statistical.clone());
        let series = window.temperatures();
        let statistical_task =
            tokio::task::spawn_blocking(move || statistical.forecast(&series, horizon));

        let (regression, statistical) = tokio::join!(regression_task, statistical_task);
        let regression = flatten(ModelKind::Regression, regression);
        let statistical = flatten(ModelKind::Statistical, statistical);

        let diagnostics = diagnostics(&regression, &statistical);

        let interval =
            window.sampling_interval(Duration::minutes(cfg.default_interval_minutes));
        let forecast = assemble(
            window.last_timestamp(),
            interval,
            horizon,
            regression,
            statistical,
        )?;

        info!(
            city,
            horizon,
            interval_secs = interval.num_seconds(),
            complete = forecast.is_complete(),
            "forecast assembled"
        );

        Ok(ForecastReport {
            city: city.to_string(),
            generated_at: Utc::now(),
            window_observations: window.len(),
            confidence_level: cfg.statistical.confidence_level,
            forecast,
            diagnostics,
        })
    }
}

/// A panicked or cancelled fit task counts as a fit failure of that model
fn flatten<T>(model: ModelKind, joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    joined.unwrap_or_else(|e| Err(ForecastError::fit(model, format!("fit task failed: {}", e))))
}

fn diagnostics(
    regression: &Result<RegressionForecast>,
    statistical: &Result<StatisticalForecast>,
) -> ModelDiagnostics {
    let mut diagnostics = ModelDiagnostics::default();
    if let Ok(r) = regression {
        diagnostics.regression_holdout = r.holdout;
        diagnostics.regression_training_rows = Some(r.training_rows);
    }
    if let Ok(s) = statistical {
        diagnostics.statistical_params = Some(s.params.clone());
        diagnostics.statistical_log_likelihood = s.log_likelihood;
        diagnostics.statistical_degenerate = s.degenerate;
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::repo::MockSeriesWindowProvider;
    use chrono::{DateTime, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    }

    fn hourly(values: Vec<f64>) -> Vec<Observation> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Observation::new(start() + Duration::hours(i as i64), v, 65.0))
            .collect()
    }

    fn engine_with(observations: Vec<Observation>, config: ForecastConfig) -> ForecastEngine {
        let mut provider = MockSeriesWindowProvider::new();
        provider
            .expect_last_n_days()
            .times(1)
            .returning(move |_, _| Ok(observations.clone()));
        ForecastEngine::new(Arc::new(provider), config).unwrap()
    }

    fn daily_cycle(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 22.0 + 6.0 * (i as f64 * std::f64::consts::PI / 12.0).sin())
            .collect()
    }

    #[tokio::test]
    async fn test_full_forecast() {
        let engine = engine_with(hourly(daily_cycle(240)), ForecastConfig::default());
        let report = engine.forecast_city("Mumbai").await.unwrap();

        let forecast = &report.forecast;
        assert!(forecast.is_complete());
        assert_eq!(forecast.horizon(), 7);
        assert_eq!(report.window_observations, 240);
        assert_eq!(forecast.sampling_interval_secs, 3600);

        let last = start() + Duration::hours(239);
        for (i, step) in forecast.steps.iter().enumerate() {
            assert_eq!(step.timestamp, last + Duration::hours(i as i64 + 1));
            assert!(step.regression.unwrap().is_finite());
            assert!(step.interval.unwrap().contains(step.statistical.unwrap()));
        }

        assert_eq!(report.diagnostics.regression_training_rows, Some(172));
        assert!(report.diagnostics.regression_holdout.is_some());
        assert!(report.diagnostics.statistical_params.is_some());
    }

    #[tokio::test]
    async fn test_city_and_days_are_passed_to_provider() {
        let mut provider = MockSeriesWindowProvider::new();
        provider
            .expect_last_n_days()
            .withf(|city, days| city == "Reykjavik" && *days == 30)
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let engine = ForecastEngine::new(Arc::new(provider), ForecastConfig::default()).unwrap();

        let err = engine.forecast_city("Reykjavik").await.unwrap_err();
        assert!(matches!(
            err,
            ForecastError::EmptyWindow { ref city, days: 30 } if city == "Reykjavik"
        ));
    }

    #[tokio::test]
    async fn test_five_observations_stop_before_fitting() {
        let engine = engine_with(
            hourly(vec![20.0, 21.0, 22.0, 21.5, 20.5]),
            ForecastConfig::default(),
        );

        let err = engine.forecast_city("Lima").await.unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData { needed: 25, got: 5 }
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let mut provider = MockSeriesWindowProvider::new();
        provider
            .expect_last_n_days()
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));
        let engine = ForecastEngine::new(Arc::new(provider), ForecastConfig::default()).unwrap();

        let err = engine.forecast_city("Cairo").await.unwrap_err();
        assert!(matches!(err, ForecastError::Provider(_)));
    }

    #[tokio::test]
    async fn test_statistical_failure_leaves_partial_forecast() {
        let mut config = ForecastConfig {
            lags: 4,
            ..ForecastConfig::default()
        };
        config.statistical.min_observations = 50;

        let engine = engine_with(hourly(daily_cycle(20)), config);
        let report = engine.forecast_city("Quito").await.unwrap();

        let forecast = &report.forecast;
        assert!(!forecast.is_complete());
        assert_eq!(forecast.regression_values().map(|v| v.len()), Some(7));
        assert!(forecast.statistical_values().is_none());
        assert!(forecast.intervals().is_none());
        let failure = forecast.failure(ModelKind::Statistical).unwrap();
        assert!(failure.message.contains("need at least 50"));
        assert!(report.diagnostics.statistical_params.is_none());
    }

    #[tokio::test]
    async fn test_constant_series() {
        let engine = engine_with(hourly(vec![15.0; 72]), ForecastConfig::default());
        let report = engine.forecast_city("Lisbon").await.unwrap();

        assert!(report.diagnostics.statistical_degenerate);
        for step in &report.forecast.steps {
            assert!((step.regression.unwrap() - 15.0).abs() < 1e-9);
            assert!((step.statistical.unwrap() - 15.0).abs() < 1e-9);
            assert!(step.interval.unwrap().width() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_up_front() {
        let config = ForecastConfig {
            train_ratio: 1.5,
            ..ForecastConfig::default()
        };
        let provider = MockSeriesWindowProvider::new();
        assert!(matches!(
            ForecastEngine::new(Arc::new(provider), config),
            Err(ForecastError::InvalidConfig(_))
        ));
    }
}
