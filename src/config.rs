use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::forecast::statistical::StatisticalSettings;
use crate::ml::smartcore::ForestParams;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub city: String,
    pub forecast: ForecastConfig,
    pub store: StoreConfig,
    pub openweather: OpenWeatherConfig,
    pub ingest: IngestConfig,
    pub report: ReportConfig,
}

/// Longest forecast horizon accepted, one year of hourly steps
pub const MAX_HORIZON: usize = 24 * 365;

/// Forecasting pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Look-back window in days
    pub days: u32,
    pub lags: usize,
    pub horizon: usize,
    pub train_ratio: f64,
    /// Sampling interval used when the window has a single observation
    pub default_interval_minutes: i64,
    pub forest: ForestParams,
    pub statistical: StatisticalSettings,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            days: 30,
            lags: 24,
            horizon: 7,
            train_ratio: 0.8,
            default_interval_minutes: 60,
            forest: ForestParams::default(),
            statistical: StatisticalSettings::default(),
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> std::result::Result<(), ForecastError> {
        let invalid = |msg: String| Err(ForecastError::InvalidConfig(msg));

        if self.days == 0 {
            return invalid("forecast.days must be at least 1".into());
        }
        if self.lags == 0 {
            return invalid("forecast.lags must be at least 1".into());
        }
        if self.horizon > MAX_HORIZON {
            return invalid(format!(
                "forecast.horizon must be at most {}, got {}",
                MAX_HORIZON, self.horizon
            ));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio <= 1.0) {
            return invalid(format!(
                "forecast.train_ratio must be in (0, 1], got {}",
                self.train_ratio
            ));
        }
        if self.default_interval_minutes <= 0 {
            return invalid("forecast.default_interval_minutes must be positive".into());
        }
        if self.forest.n_trees == 0 {
            return invalid("forecast.forest.n_trees must be at least 1".into());
        }

        let stat = &self.statistical;
        if stat.order.d != 0 {
            return invalid(format!(
                "differencing is not supported, got order {}",
                stat.order
            ));
        }
        if !(stat.confidence_level > 0.0 && stat.confidence_level < 1.0) {
            return invalid(format!(
                "forecast.statistical.confidence_level must be in (0, 1), got {}",
                stat.confidence_level
            ));
        }
        if stat.min_observations < stat.order.state_dim() + 1 {
            return invalid(format!(
                "forecast.statistical.min_observations must exceed {} for order {}",
                stat.order.state_dim(),
                stat.order
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON file read into memory
    #[default]
    File,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: String,
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: "data/observations.json".to_string(),
            database_url: String::new(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenWeatherConfig {
    pub base_url: String,
    pub api_key: String,
    pub http_timeout_seconds: u64,
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org".to_string(),
            api_key: String::new(),
            http_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Polling interval; 0 fetches a single observation and exits
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: "reports".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("WEATHER__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Self = figment.extract()?;
        cfg.forecast.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ForecastConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.lags, 24);
        assert_eq!(cfg.horizon, 7);
        assert_eq!(cfg.forest.n_trees, 100);
        assert_eq!(cfg.forest.seed, 42);
        assert_eq!(cfg.statistical.min_observations, 10);
        assert!(!cfg.statistical.enforce_stationarity);
    }

    #[test]
    fn test_validation_rejects_differencing() {
        let mut cfg = ForecastConfig::default();
        cfg.statistical.order.d = 1;
        assert!(matches!(
            cfg.validate(),
            Err(ForecastError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_confidence() {
        let mut cfg = ForecastConfig::default();
        cfg.statistical.confidence_level = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_horizon() {
        let mut cfg = ForecastConfig {
            horizon: MAX_HORIZON,
            ..ForecastConfig::default()
        };
        assert!(cfg.validate().is_ok());

        cfg.horizon = MAX_HORIZON + 1;
        assert!(matches!(
            cfg.validate(),
            Err(ForecastError::InvalidConfig(ref msg)) if msg.contains("forecast.horizon")
        ));
    }

    #[test]
    fn test_toml_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "weather.toml",
                r#"
                city = "Mumbai"

                [forecast]
                horizon = 12

                [forecast.statistical]
                confidence_level = 0.9

                [store]
                backend = "postgres"
                "#,
            )?;
            jail.set_env("WEATHER__CITY", "Pune");
            jail.set_env("WEATHER__FORECAST__LAGS", "48");

            let cfg = Config::from_figment(
                Figment::from(Serialized::defaults(Config::default()))
                    .merge(Toml::file("weather.toml"))
                    .merge(Env::prefixed("WEATHER__").split("__")),
            )
            .unwrap();

            assert_eq!(cfg.city, "Pune");
            assert_eq!(cfg.forecast.horizon, 12);
            assert_eq!(cfg.forecast.lags, 48);
            assert_eq!(cfg.forecast.train_ratio, 0.8);
            assert_eq!(cfg.forecast.statistical.confidence_level, 0.9);
            assert_eq!(cfg.store.backend, StoreBackend::Postgres);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_fail_to_load() {
        Jail::expect_with(|jail| {
            jail.set_env("WEATHER__FORECAST__TRAIN_RATIO", "0");
            let result = Config::from_figment(
                Figment::new().merge(Env::prefixed("WEATHER__").split("__")),
            );
            assert!(result.is_err());
            Ok(())
        });
    }
}
