use anyhow::Result;
use city_weather_forecaster::config::Config;
use city_weather_forecaster::ingest::{run_ingest, IngestSchedule, OpenWeatherClient};
use city_weather_forecaster::repo::Repositories;
use city_weather_forecaster::telemetry::{init_tracing, shutdown_signal};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let city = std::env::args().nth(1).unwrap_or_else(|| cfg.city.clone());
    if city.trim().is_empty() {
        anyhow::bail!("no city given; pass it as the first argument or set WEATHER__CITY");
    }

    let client = OpenWeatherClient::from_config(&cfg.openweather)?;
    let repos = Repositories::new(&cfg.store).await?;
    let schedule = IngestSchedule::from_seconds(cfg.ingest.interval_seconds);

    let stored = run_ingest(&client, repos.sink.as_ref(), &city, schedule, shutdown_signal()).await?;

    info!(%city, stored, "ingest finished");
    Ok(())
}
