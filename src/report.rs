//! JSON forecast report written next to the run

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::info;

use crate::domain::{ForecastReport, SeriesWindow};

/// Descriptive statistics of one measurement over the window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl SeriesSummary {
    pub fn of(values: &[f64]) -> Self {
        Self {
            count: values.len(),
            min: Statistics::min(values.iter()),
            max: Statistics::max(values.iter()),
            mean: Statistics::mean(values.iter()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub temperature: SeriesSummary,
    pub humidity: SeriesSummary,
    #[serde(flatten)]
    pub report: ForecastReport,
}

pub fn report_file_name(city: &str) -> String {
    let slug: String = city
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("report_{}.json", slug)
}

/// Write the report for `report.city` into `dir`, returning the file path
pub async fn write_report(
    dir: impl AsRef<Path>,
    report: &ForecastReport,
    window: &SeriesWindow,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create report directory {}", dir.display()))?;

    let document = ReportDocument {
        temperature: SeriesSummary::of(&window.temperatures()),
        humidity: SeriesSummary::of(&window.humidities()),
        report: report.clone(),
    };
    let json = serde_json::to_vec_pretty(&document).context("serialize report")?;

    let path = dir.join(report_file_name(&report.city));
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("write report {}", path.display()))?;

    info!(path = %path.display(), "report written");
    Ok(path)
}
