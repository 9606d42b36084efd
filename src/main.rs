//! Car Store Server - Main entry point.

use car_store_server::config::Config;
use car_store_server::db::{HealthMonitor, PoolManager};
use car_store_server::store::CarStore;
use car_store_server::transport::{HttpTransport, Transport};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!("Starting Car Store Server v{}", env!("CARGO_PKG_VERSION"));

    let db_config = config.parse_database()?;
    let policy = config.retry_policy()?;
    let pool = PoolManager::new(db_config, policy)?;

    let store = CarStore::new(pool.clone());

    // The database may come up later; requests retry on their own.
    if pool.check_connection().await {
        info!(db_type = %pool.db_type(), "Database connection established");
        if let Err(e) = store.ensure_schema().await {
            warn!(error = %e, "Schema setup failed, will retry on first request");
        }
    } else {
        warn!("Database unreachable at startup, continuing");
    }

    let monitor = HealthMonitor::start(pool.clone(), config.health_interval_duration());

    info!(addr = %config.http_bind_addr(), "Using HTTP transport");
    let transport = HttpTransport::new(store, &config.http_host, config.http_port);
    let result = transport.run().await;

    monitor.stop();
    pool.close().await;

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
