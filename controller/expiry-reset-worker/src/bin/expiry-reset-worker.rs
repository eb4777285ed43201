//! Expiry reset worker binary - resets the backend when the counter key expires

use expiry_reset_worker::{Config, ResetWorker};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse_config();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting expiry reset worker");
    info!("Configuration:");
    info!("  Redis: {}:{}", config.redis_host, config.redis_port);
    info!("  Reset endpoint: {}", config.reset_endpoint_url);
    info!("  Counter key: {}", config.counter_key);
    match config.expired_db_index {
        Some(db) => info!("  Database scope: {}", db),
        None => info!("  Database scope: any"),
    }
    info!("  Serialize resets: {}", config.serialize_resets);

    let worker = match ResetWorker::from_config(&config) {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to start worker: {:#}", e);
            return Err(e);
        }
    };

    match worker.run().await {
        Ok(()) => {
            info!("Expiry reset worker exited normally");
            Ok(())
        }
        Err(e) => {
            error!("Expiry reset worker failed: {:#}", e);
            Err(e)
        }
    }
}
