#![cfg(feature = "db")]
//! Postgres-backed observation store
//!
//! Rows live in `weather_observations`. Several rows may share an
//! `observation_time` (the provider's `dt` only advances when the upstream
//! station reports), so reads keep the most recently inserted row per
//! timestamp.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

use super::{ObservationSink, SeriesWindowProvider};
use crate::domain::{Observation, WeatherRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS weather_observations (
    id BIGSERIAL PRIMARY KEY,
    city TEXT NOT NULL,
    country TEXT,
    observation_time TIMESTAMPTZ NOT NULL,
    temperature_c DOUBLE PRECISION NOT NULL,
    humidity DOUBLE PRECISION NOT NULL,
    pressure DOUBLE PRECISION,
    wind_speed DOUBLE PRECISION,
    weather_main TEXT,
    weather_description TEXT,
    raw_json JSONB
);
CREATE INDEX IF NOT EXISTS weather_observations_city_time
    ON weather_observations (city, observation_time);
"#;

#[derive(Debug, Clone, sqlx::FromRow)]
struct ObservationRow {
    observation_time: DateTime<Utc>,
    temperature_c: f64,
    humidity: f64,
}

impl From<ObservationRow> for Observation {
    fn from(row: ObservationRow) -> Self {
        Observation::new(row.observation_time, row.temperature_c, row.humidity)
    }
}

pub struct PgObservationStore {
    pool: PgPool,
}

impl PgObservationStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("connect to postgres")?;
        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("create weather_observations schema")?;
        Ok(())
    }
}

#[async_trait]
impl SeriesWindowProvider for PgObservationStore {
    async fn last_n_days(&self, city: &str, days: u32) -> Result<Vec<Observation>> {
        let days_param = i32::try_from(days)
            .with_context(|| format!("look-back of {} days is out of range", days))?;

        let rows = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT DISTINCT ON (observation_time)
                observation_time, temperature_c, humidity
            FROM weather_observations
            WHERE city = $1
              AND observation_time >= now() - make_interval(days => $2)
            ORDER BY observation_time ASC, id DESC
            "#,
        )
        .bind(city)
        .bind(days_param)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("load last {} days for {}", days, city))?;

        debug!(city, days, rows = rows.len(), "observation window loaded");

        Ok(rows.into_iter().map(Observation::from).collect())
    }
}

#[async_trait]
impl ObservationSink for PgObservationStore {
    async fn insert(&self, record: &WeatherRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO weather_observations (
                city, country, observation_time, temperature_c, humidity,
                pressure, wind_speed, weather_main, weather_description, raw_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&record.city)
        .bind(&record.country)
        .bind(record.observed_at)
        .bind(record.temperature_c)
        .bind(record.humidity)
        .bind(record.pressure_hpa)
        .bind(record.wind_speed_ms)
        .bind(&record.weather_main)
        .bind(&record.weather_description)
        .bind(&record.raw_json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert observation for {}", record.city))?;

        Ok(())
    }
}
