use anyhow::{Context, Result};
use dotenv::dotenv;
use parlay_core::calibration::{CalibrationService, CalibrationStore, CalibrationTrainer};
use parlay_core::config::EngineConfig;
use parlay_core::db::{check_pool_health, create_pool, DbPoolConfig, PgCalibrationStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Calibration Worker...");

    let config = EngineConfig::load().context("Invalid configuration")?;
    config.log_config();

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set for the calibration worker")?;

    // Database
    let pool = create_pool(
        &database_url,
        &DbPoolConfig::from_env_with_defaults(DbPoolConfig::worker()),
    )
    .await?;
    if let Err(e) = check_pool_health(&pool).await {
        warn!("Database health check failed at startup: {}", e);
    }

    let store: Arc<dyn CalibrationStore> = Arc::new(PgCalibrationStore::new(pool));
    let service = Arc::new(CalibrationService::new(
        store.clone(),
        config.calibration_cache_ttl,
    ));
    let trainer = Arc::new(CalibrationTrainer::new(
        store,
        service,
        config.calibration_min_samples,
    ));

    let handle = trainer.start_background(config.calibration_interval);
    info!(
        "Calibration loop started (interval: {}s, min samples: {})",
        config.calibration_interval.as_secs(),
        config.calibration_min_samples
    );

    tokio::select! {
        result = handle => {
            if let Err(e) = result {
                error!("Calibration loop terminated: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received shutdown signal"),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        }
    }

    Ok(())
}
