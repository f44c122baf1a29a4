//! In-process observation store, optionally backed by a JSON file

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ObservationSink, SeriesWindowProvider};
use crate::domain::{Observation, WeatherRecord};

type CitySeries = BTreeMap<DateTime<Utc>, WeatherRecord>;

/// Records keyed by city, then by observation time.
///
/// A second record for the same city and timestamp replaces the first, so
/// reads are always ordered and free of duplicate timestamps.
#[derive(Debug, Default)]
pub struct InMemoryObservationStore {
    cities: RwLock<HashMap<String, CitySeries>>,
    path: Option<PathBuf>,
}

impl InMemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file-backed store. A missing file starts an empty store that
    /// is created on the first insert.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let records: Vec<WeatherRecord> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse observation store {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("read observation store {}", path.display()))
            }
        };

        debug!(path = %path.display(), records = records.len(), "observation store opened");

        let store = Self {
            cities: RwLock::new(HashMap::new()),
            path: Some(path),
        };
        {
            let mut cities = store.cities.write().await;
            for record in records {
                Self::put(&mut cities, record);
            }
        }
        Ok(store)
    }

    pub async fn len(&self) -> usize {
        self.cities.read().await.values().map(|s| s.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Observations of `city` at or after `now - days`, ascending
    pub async fn window_ending_at(
        &self,
        city: &str,
        days: u32,
        now: DateTime<Utc>,
    ) -> Vec<Observation> {
        let cutoff = now - Duration::days(i64::from(days));
        let cities = self.cities.read().await;
        cities
            .get(city)
            .map(|series| {
                series
                    .range(cutoff..)
                    .map(|(_, record)| record.observation())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Write every record to the backing file. No-op for a purely in-memory store.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = {
            let cities = self.cities.read().await;
            let records: Vec<&WeatherRecord> =
                cities.values().flat_map(|series| series.values()).collect();
            serde_json::to_vec_pretty(&records).context("serialize observation store")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("write observation store {}", path.display()))
    }

    fn put(cities: &mut HashMap<String, CitySeries>, record: WeatherRecord) {
        cities
            .entry(record.city.clone())
            .or_default()
            .insert(record.observed_at, record);
    }
}

#[async_trait]
impl SeriesWindowProvider for InMemoryObservationStore {
    async fn last_n_days(&self, city: &str, days: u32) -> Result<Vec<Observation>> {
        Ok(self.window_ending_at(city, days, Utc::now()).await)
    }
}

#[async_trait]
impl ObservationSink for InMemoryObservationStore {
    async fn insert(&self, record: &WeatherRecord) -> Result<()> {
        {
            let mut cities = self.cities.write().await;
            Self::put(&mut cities, record.clone());
        }
        self.save().await
    }
}
