pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod ml;
pub mod report;
pub mod repo;
pub mod telemetry;

pub use error::{ForecastError, ModelKind};
