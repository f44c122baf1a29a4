use anyhow::Result;
use city_weather_forecaster::{config, forecast, report, repo, telemetry, ForecastError};
use config::Config;
use forecast::ForecastEngine;
use repo::Repositories;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let city = std::env::args().nth(1).unwrap_or_else(|| cfg.city.clone());
    if city.trim().is_empty() {
        anyhow::bail!("no city given; pass it as the first argument or set WEATHER__CITY");
    }

    let repos = Repositories::new(&cfg.store).await?;
    let engine = ForecastEngine::new(repos.windows.clone(), cfg.forecast.clone())?;

    let window = match engine.load_window(&city, cfg.forecast.days).await {
        Ok(window) => window,
        Err(ForecastError::EmptyWindow { city, days }) => {
            warn!(%city, days, "no observations in window, nothing to forecast");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let report = engine.forecast_window(&city, &window).await?;
    for failure in &report.forecast.failures {
        warn!(model = %failure.model, error = %failure.message, "model produced no forecast");
    }

    let path = report::write_report(&cfg.report.output_dir, &report, &window).await?;
    info!(%city, path = %path.display(), horizon = report.forecast.horizon(), "forecast complete");
    Ok(())
}
