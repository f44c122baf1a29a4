//! Temperature forecasting pipeline
//!
//! - [`features`]: lag table from an observation window
//! - [`regression`]: random forest with iterative projection
//! - [`statistical`]: ARMA point forecasts and confidence intervals
//! - [`assembler`]: alignment on the future time index
//! - [`engine`]: end-to-end orchestration for one city

pub mod assembler;
pub mod engine;
pub mod features;
pub mod regression;
pub mod statistical;

pub use assembler::assemble;
pub use engine::ForecastEngine;
pub use features::{build_lag_table, LagTable};
pub use regression::{RegressionForecast, RegressionForecaster};
pub use statistical::{StatisticalForecast, StatisticalForecaster, StatisticalSettings};
