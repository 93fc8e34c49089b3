//! Reward Ledger Service
//!
//! Connects to PostgreSQL, applies migrations and runs the hourly price
//! refresh job until shutdown.

use reward_ledger::config::AppConfig;
use reward_ledger::database::{create_pool, run_migrations};
use reward_ledger::error::{AppError, AppResult};
use reward_ledger::repositories::PgLedgerStore;
use reward_ledger::services::SimulatedPriceOracle;
use reward_ledger::AppState;
use std::sync::Arc;
use tracing::{error, info};

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("reward_ledger={},sqlx=warn", config.log_level).into()
    });

    if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    init_tracing(&config);

    info!("Reward ledger service starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);

    info!("Connecting to database...");
    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;
    info!(
        max_connections = config.database.max_connections,
        "Database connection pool created"
    );

    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;
    info!("Database migrations completed");

    let store = Arc::new(PgLedgerStore::new(pool));
    let oracle = Arc::new(SimulatedPriceOracle::new(
        config.scheduler.price_seed,
        store.clone(),
    ));
    let state = AppState::new(store, oracle, &config);
    info!(
        price_timeout_ms = config.engine.price_fetch_timeout_ms,
        "Reward engine initialized"
    );

    let refresher = state.price_refresher(&config);
    let refresher_handle = tokio::spawn(refresher.start());
    info!(
        interval_secs = config.scheduler.price_refresh_interval_secs,
        "Price refresher started"
    );

    info!("Press Ctrl+C to shutdown gracefully");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = refresher_handle => {
            error!("Price refresher exited unexpectedly");
        }
    }

    info!("Reward ledger service shutdown complete");
    Ok(())
}
