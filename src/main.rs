use std::process::ExitCode;
use std::sync::Arc;

use webcam_ingest::config::Config;
use webcam_ingest::db::create_pool;
use webcam_ingest::registry::PgCameraRegistry;
use webcam_ingest::services::run_driver::total_saved;
use webcam_ingest::services::sources::{select_sources, SourceAdapter};
use webcam_ingest::services::{GeocodingService, NominatimGeocoder, RunDriver};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webcam_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let selection = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let kinds = match select_sources(&selection) {
        Ok(kinds) => kinds,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(ExitCode::from(2));
        }
    };

    let config = Config::from_env()?;

    tracing::info!("Starting camera ingest: {}", selection);
    tracing::info!("Connecting to database {}", config.database_url_redacted());

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database connection established");

    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
    for kind in kinds {
        if let Some(adapter) = kind.build(&config)? {
            adapters.push(adapter);
        }
    }

    let geocoding = GeocodingService::new(
        Box::new(NominatimGeocoder::new(&config.geocoder)?),
        config.geocoder.min_delay,
    );
    let driver = RunDriver::new(Arc::new(PgCameraRegistry::new(pool.clone())), geocoding);

    let summaries = driver.run_all(&adapters).await;
    let saved = total_saved(&summaries);
    pool.close().await;

    tracing::info!("Done. Saved {} cameras across {} sources", saved, summaries.len());
    if saved > 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
