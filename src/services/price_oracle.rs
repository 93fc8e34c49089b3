//! Price oracle contract and the simulated feed used until a market data
//! integration exists.

use crate::error::PriceError;
use crate::money::Money;
use crate::repositories::LedgerStore;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Best-effort current price for `symbol`.
    async fn current_price(&self, symbol: &str) -> Result<Money, PriceError>;

    /// Fetch a price and durably store it as an observation.
    async fn record_observation(&self, symbol: &str) -> Result<Money, PriceError>;
}

/// Seeded pseudo-random prices: `100 + 10 * len(symbol)` plus up to 100 of
/// jitter, at 4 decimal places.
pub struct SimulatedPriceOracle<S> {
    rng: Mutex<StdRng>,
    store: Arc<S>,
}

impl<S: LedgerStore> SimulatedPriceOracle<S> {
    pub fn new(seed: u64, store: Arc<S>) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            store,
        }
    }

    fn quote(&self, symbol: &str) -> Money {
        let base = Decimal::from(100 + 10 * symbol.chars().count() as i64);
        let jitter_units: i64 = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..1_000_000);
        Money::new(base + Decimal::new(jitter_units, 4)).round4()
    }
}

#[async_trait]
impl<S: LedgerStore> PriceOracle for SimulatedPriceOracle<S> {
    async fn current_price(&self, symbol: &str) -> Result<Money, PriceError> {
        if symbol.trim().is_empty() {
            return Err(PriceError::Unavailable {
                symbol: symbol.to_string(),
                reason: "empty symbol".to_string(),
            });
        }
        Ok(self.quote(symbol))
    }

    async fn record_observation(&self, symbol: &str) -> Result<Money, PriceError> {
        let price = self.current_price(symbol).await?;
        self.store
            .insert_price_observation(symbol, price, Utc::now())
            .await?;
        debug!(symbol, %price, "recorded price observation");
        Ok(price)
    }
}
