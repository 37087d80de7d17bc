use chrono::Utc;
use log::{error, info};
use station_link::{ensure_dir_exists, Config, FileStore, Pipeline, StationLinkError};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

async fn build_pipeline(config: Config) -> Result<Pipeline<FileStore>, StationLinkError> {
    let data_dir = config.data_dir()?;
    ensure_dir_exists(&data_dir).await?;
    let store = Arc::new(FileStore::open(&data_dir)?);
    Ok(Pipeline::new(config, store))
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    info!("Starting ingestion worker...");
    let pipeline = match build_pipeline(config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to open data store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = pipeline.run_one_time_setup().await {
        error!("One-time setup failed: {:?}", e);
        error!("Exiting due to setup failure");
        return ExitCode::FAILURE;
    }

    info!("Starting hourly ingestion loop...");
    loop {
        match pipeline.run_hourly_cycle(Utc::now()).await {
            Ok(report) => info!(
                "Cycle done: {} stations upserted, {} links, {} stations in scope",
                report.stations.inserted, report.rebuild.links_written, report.scope_stations
            ),
            Err(e) => error!("Hourly cycle failed: {:?}", e),
        }
        let seconds = station_link::seconds_until_next_run(Utc::now());
        info!("Sleeping {} seconds until next run (1st minute of next hour)", seconds);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}
