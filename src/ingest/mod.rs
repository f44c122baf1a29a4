//! Observation acquisition: poll the weather provider and persist results

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::domain::WeatherRecord;
use crate::repo::ObservationSink;

pub mod openweather;

pub use openweather::OpenWeatherClient;

/// Anything that can report the current weather for a city
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_current(&self, city: &str) -> Result<WeatherRecord>;
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn fetch_current(&self, city: &str) -> Result<WeatherRecord> {
        OpenWeatherClient::fetch_current(self, city).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestSchedule {
    Once,
    Every(Duration),
}

impl IngestSchedule {
    /// Zero seconds means a single run
    pub fn from_seconds(seconds: u64) -> Self {
        if seconds == 0 {
            Self::Once
        } else {
            Self::Every(Duration::from_secs(seconds))
        }
    }
}

/// Fetch one observation and store it
pub async fn ingest_once(
    source: &dyn WeatherSource,
    sink: &dyn ObservationSink,
    city: &str,
) -> Result<WeatherRecord> {
    let record = source.fetch_current(city).await?;
    sink.insert(&record).await?;
    info!(
        city = %record.city,
        observed_at = %record.observed_at,
        temperature_c = record.temperature_c,
        "observation stored"
    );
    Ok(record)
}

/// Run the ingest schedule until it completes or `shutdown` resolves.
///
/// A single run propagates its error. A periodic run logs failed polls and
/// keeps going. Returns the number of stored observations.
pub async fn run_ingest<S>(
    source: &dyn WeatherSource,
    sink: &dyn ObservationSink,
    city: &str,
    schedule: IngestSchedule,
    shutdown: S,
) -> Result<usize>
where
    S: Future<Output = ()>,
{
    let period = match schedule {
        IngestSchedule::Once => {
            ingest_once(source, sink, city).await?;
            return Ok(1);
        }
        IngestSchedule::Every(period) => period,
    };

    info!(city, period_secs = period.as_secs(), "periodic ingest started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut stored = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match ingest_once(source, sink, city).await {
                    Ok(_) => stored += 1,
                    Err(e) => warn!(city, error = %format!("{:#}", e), "ingest poll failed"),
                }
            }
        }
    }

    info!(city, stored, "periodic ingest stopped");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{InMemoryObservationStore, MockObservationSink};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn record(minute: i64) -> WeatherRecord {
        WeatherRecord {
            city: "Mumbai".to_string(),
            country: Some("IN".to_string()),
            observed_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
                + ChronoDuration::minutes(minute),
            temperature_c: 30.0,
            humidity: 70.0,
            pressure_hpa: None,
            wind_speed_ms: None,
            weather_main: None,
            weather_description: None,
            raw_json: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_schedule_from_seconds() {
        assert_eq!(IngestSchedule::from_seconds(0), IngestSchedule::Once);
        assert_eq!(
            IngestSchedule::from_seconds(3600),
            IngestSchedule::Every(Duration::from_secs(3600))
        );
    }

    #[tokio::test]
    async fn test_single_run_stores_one_record() {
        let mut source = MockWeatherSource::new();
        source
            .expect_fetch_current()
            .withf(|city| city == "Mumbai")
            .times(1)
            .returning(|_| Ok(record(0)));
        let sink = InMemoryObservationStore::new();

        let stored = run_ingest(
            &source,
            &sink,
            "Mumbai",
            IngestSchedule::Once,
            std::future::pending::<()>(),
        )
        .await
        .unwrap();

        assert_eq!(stored, 1);
        assert_eq!(sink.len().await, 1);
    }

    #[tokio::test]
    async fn test_single_run_propagates_sink_failure() {
        let mut source = MockWeatherSource::new();
        source.expect_fetch_current().returning(|_| Ok(record(0)));
        let mut sink = MockObservationSink::new();
        sink.expect_insert()
            .returning(|_| Err(anyhow::anyhow!("disk full")));

        let result = run_ingest(
            &source,
            &sink,
            "Mumbai",
            IngestSchedule::Once,
            std::future::pending::<()>(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_run_survives_failures_until_shutdown() {
        let mut source = MockWeatherSource::new();
        let mut calls = 0;
        source.expect_fetch_current().returning(move |_| {
            calls += 1;
            if calls == 2 {
                Err(anyhow::anyhow!("timeout"))
            } else {
                Ok(record(calls))
            }
        });
        let sink = InMemoryObservationStore::new();

        // ticks at 0, 60 and 120 seconds, shutdown at 150
        let shutdown = tokio::time::sleep(Duration::from_secs(150));
        let stored = run_ingest(
            &source,
            &sink,
            "Mumbai",
            IngestSchedule::Every(Duration::from_secs(60)),
            shutdown,
        )
        .await
        .unwrap();

        assert_eq!(stored, 2);
        assert_eq!(sink.len().await, 2);
    }
}
