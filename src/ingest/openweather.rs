//! OpenWeatherMap current-conditions client

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::OpenWeatherConfig;
use crate::domain::WeatherRecord;

/// Fetches the current observation for a city
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            anyhow::bail!("OpenWeatherMap API key is empty; set WEATHER__OPENWEATHER__API_KEY");
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(cfg: &OpenWeatherConfig) -> Result<Self> {
        Self::new(
            cfg.base_url.clone(),
            cfg.api_key.clone(),
            Duration::from_secs(cfg.http_timeout_seconds),
        )
    }

    pub async fn fetch_current(&self, city: &str) -> Result<WeatherRecord> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        debug!(city, "fetching current weather");

        let response = self
            .client
            .get(&url)
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await
            .context("send request to OpenWeatherMap")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(city, %status, "OpenWeatherMap returned an error");
            anyhow::bail!("OpenWeatherMap error {}: {}", status, body);
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .context("parse OpenWeatherMap response")?;

        parse_current(city, raw)
    }
}

/// Map a current-weather payload onto a stored record
pub fn parse_current(requested_city: &str, raw: serde_json::Value) -> Result<WeatherRecord> {
    let payload: CurrentWeather =
        serde_json::from_value(raw.clone()).context("unexpected current-weather payload")?;

    let observed_at = DateTime::<Utc>::from_timestamp(payload.dt, 0)
        .with_context(|| format!("observation time {} out of range", payload.dt))?;
    let condition = payload.weather.into_iter().next();

    Ok(WeatherRecord {
        city: payload
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| requested_city.to_string()),
        country: payload.sys.and_then(|s| s.country),
        observed_at,
        temperature_c: payload.main.temp,
        humidity: payload.main.humidity,
        pressure_hpa: payload.main.pressure,
        wind_speed_ms: payload.wind.and_then(|w| w.speed),
        weather_main: condition.as_ref().and_then(|c| c.main.clone()),
        weather_description: condition.and_then(|c| c.description),
        raw_json: raw,
    })
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    name: Option<String>,
    dt: i64,
    main: MainBlock,
    sys: Option<SysBlock>,
    wind: Option<WindBlock>,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SysBlock {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: Option<String>,
    description: Option<String>,
}
