//! Reward Ledger Library
//!
//! Records stock rewards granted to users as balanced double-entry ledger
//! postings, keeps a per-user holdings cache and values portfolios from
//! stored price observations.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod money;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, PriceError, RewardError, StoreError};
pub use money::Money;

use repositories::LedgerStore;
use services::{PriceOracle, PriceRefresher, ReportingService, RewardEngine};
use std::sync::Arc;

/// Application state: one store shared by the engine, the reporting
/// service and the price refresh job
pub struct AppState<S: LedgerStore> {
    pub store: Arc<S>,
    pub oracle: Arc<dyn PriceOracle>,
    pub engine: Arc<RewardEngine<S>>,
    pub reporting: Arc<ReportingService<S>>,
}

impl<S: LedgerStore> AppState<S> {
    /// Wire services over `store` using the tuning in `config`
    pub fn new(store: Arc<S>, oracle: Arc<dyn PriceOracle>, config: &AppConfig) -> Self {
        let engine = RewardEngine::new(store.clone(), oracle.clone())
            .with_price_timeout(config.engine.price_fetch_timeout());

        Self {
            engine: Arc::new(engine),
            reporting: Arc::new(ReportingService::new(store.clone())),
            oracle,
            store,
        }
    }

    /// Price refresh job over the same store and oracle
    pub fn price_refresher(&self, config: &AppConfig) -> PriceRefresher<S> {
        PriceRefresher::new(self.store.clone(), self.oracle.clone())
            .with_interval(config.scheduler.price_refresh_interval())
    }
}
