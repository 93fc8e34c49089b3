use crate::error::StoreError;
use crate::repositories::LedgerStore;
use crate::services::price_oracle::PriceOracle;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

/// Outcome of one refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

/// Periodic job that records a price observation for every rewarded symbol
pub struct PriceRefresher<S> {
    store: Arc<S>,
    oracle: Arc<dyn PriceOracle>,
    interval: Duration,
    concurrency: usize,
}

impl<S: LedgerStore> PriceRefresher<S> {
    pub fn new(store: Arc<S>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            store,
            oracle,
            interval: Duration::from_secs(3600), // Default: hourly
            concurrency: 4,
        }
    }

    /// Set refresh interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set how many symbols are fetched at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run forever, one pass per interval (the first pass runs immediately)
    pub async fn start(self) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Price refresher started, refreshing every {:?}", self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.run_once().await {
                error!("Error in price refresher: {}", e);
            }
        }
    }

    /// One pass over all rewarded symbols. A failing symbol is logged and
    /// counted; it does not stop the others.
    pub async fn run_once(&self) -> Result<RefreshSummary, StoreError> {
        let symbols = self.store.distinct_reward_symbols().await?;
        if symbols.is_empty() {
            return Ok(RefreshSummary::default());
        }

        info!(symbols = symbols.len(), "Price refresh started");

        let results: Vec<(String, bool)> = stream::iter(symbols)
            .map(|symbol| {
                let oracle = self.oracle.clone();
                async move {
                    match oracle.record_observation(&symbol).await {
                        Ok(_) => (symbol, true),
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "price fetch failed");
                            (symbol, false)
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let refreshed = results.iter().filter(|(_, ok)| *ok).count();
        let summary = RefreshSummary {
            refreshed,
            failed: results.len() - refreshed,
        };

        info!(
            refreshed = summary.refreshed,
            failed = summary.failed,
            "Price refresh done"
        );
        Ok(summary)
    }
}
