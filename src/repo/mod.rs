//! Observation storage
//!
//! The forecasting core only reads through [`SeriesWindowProvider`]; the
//! ingest loop only writes through [`ObservationSink`].

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};
use crate::domain::{Observation, WeatherRecord};

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

pub use memory::InMemoryObservationStore;
#[cfg(feature = "db")]
pub use pg::PgObservationStore;

/// Source of recent observation windows.
///
/// Implementations return the observations of `city` recorded within the
/// last `days` days, ascending by timestamp, with at most one observation
/// per timestamp. An empty vector means "no data".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SeriesWindowProvider: Send + Sync {
    async fn last_n_days(&self, city: &str, days: u32) -> Result<Vec<Observation>>;
}

/// Destination for freshly acquired observations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationSink: Send + Sync {
    async fn insert(&self, record: &WeatherRecord) -> Result<()>;
}

/// The configured store, seen through both access traits
pub struct Repositories {
    pub windows: Arc<dyn SeriesWindowProvider>,
    pub sink: Arc<dyn ObservationSink>,
}

impl Repositories {
    pub async fn new(cfg: &StoreConfig) -> Result<Self> {
        match cfg.backend {
            StoreBackend::File => {
                let store = Arc::new(InMemoryObservationStore::open(&cfg.path).await?);
                info!(path = %cfg.path, "using file observation store");
                Ok(Self {
                    windows: store.clone(),
                    sink: store,
                })
            }
            StoreBackend::Postgres => {
                #[cfg(feature = "db")]
                {
                    let store =
                        Arc::new(PgObservationStore::connect(&cfg.database_url, cfg.max_connections).await?);
                    store.ensure_schema().await?;
                    info!("using postgres observation store");
                    Ok(Self {
                        windows: store.clone(),
                        sink: store,
                    })
                }

                #[cfg(not(feature = "db"))]
                {
                    anyhow::bail!("store.backend = \"postgres\" requires building with the `db` feature")
                }
            }
        }
    }
}
