#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reward_ledger::error::{PriceError, StoreError};
use reward_ledger::models::*;
use reward_ledger::money::Money;
use reward_ledger::repositories::*;
use reward_ledger::services::PriceOracle;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Dispatch;
use uuid::Uuid;

pub const USER_A: &str = "6f1c2d3e-4b5a-4c7d-8e9f-0a1b2c3d4e5f";
pub const USER_B: &str = "0b7e9a2c-1d3f-4e5a-9b8c-7d6e5f4a3b2c";

/// Helper function to build a reward request
pub fn reward_request(user_id: &str, symbol: &str, quantity: &str, key: Option<&str>) -> RewardRequest {
    RewardRequest {
        user_id: user_id.to_string(),
        symbol: symbol.to_string(),
        quantity: quantity.to_string(),
        rewarded_at: "2025-01-15T10:00:00Z".to_string(),
        idempotency_key: key.map(str::to_string),
    }
}

pub fn money(s: &str) -> Money {
    Money::parse(s).expect("valid amount")
}

pub fn user_id(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("valid uuid")
}

// ============================================================================
// Price oracles
// ============================================================================

/// Returns the same price for every symbol except the ones told to fail
pub struct FixedPriceOracle {
    price: Money,
    failing: HashSet<String>,
    store: Option<MemoryLedgerStore>,
    calls: AtomicUsize,
}

impl FixedPriceOracle {
    pub fn new(price: &str) -> Self {
        Self {
            price: money(price),
            failing: HashSet::new(),
            store: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_for(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    /// Persist observations into `store`
    pub fn recording_to(mut self, store: MemoryLedgerStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn current_price(&self, symbol: &str) -> Result<Money, PriceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(symbol) {
            return Err(PriceError::Unavailable {
                symbol: symbol.to_string(),
                reason: "feed down".to_string(),
            });
        }
        Ok(self.price)
    }

    async fn record_observation(&self, symbol: &str) -> Result<Money, PriceError> {
        let price = self.current_price(symbol).await?;
        if let Some(store) = &self.store {
            store.insert_price_observation(symbol, price, Utc::now()).await?;
        }
        Ok(price)
    }
}

/// Always fails
pub struct FailingPriceOracle;

#[async_trait]
impl PriceOracle for FailingPriceOracle {
    async fn current_price(&self, symbol: &str) -> Result<Money, PriceError> {
        Err(PriceError::Unavailable {
            symbol: symbol.to_string(),
            reason: "connection refused".to_string(),
        })
    }

    async fn record_observation(&self, symbol: &str) -> Result<Money, PriceError> {
        self.current_price(symbol).await
    }
}

/// Answers after `delay`
pub struct SlowPriceOracle {
    pub delay: Duration,
    pub price: Money,
}

#[async_trait]
impl PriceOracle for SlowPriceOracle {
    async fn current_price(&self, _symbol: &str) -> Result<Money, PriceError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.price)
    }

    async fn record_observation(&self, symbol: &str) -> Result<Money, PriceError> {
        self.current_price(symbol).await
    }
}

// ============================================================================
// Fault injection
// ============================================================================

/// Where `FaultyStore` fails. Idempotency lookup faults fire on the first
/// lookup only; write-path faults fire in every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Pre-check read errors
    IdempotencyLookup,
    /// Pre-check read misses an existing key
    BlindIdempotencyLookup,
    /// No connection available
    Begin,
    InsertReward,
    /// The n-th ledger leg (0-based) fails
    LedgerEntry(usize),
    UpsertHolding,
    Commit,
    /// Commit never completes
    StallCommit,
}

fn injected(what: &str) -> StoreError {
    StoreError::Failure(format!("injected failure: {}", what))
}

/// Memory store that fails at a chosen point
#[derive(Clone)]
pub struct FaultyStore {
    pub inner: MemoryLedgerStore,
    fault: Fault,
    lookup_fired: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new(inner: MemoryLedgerStore, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            lookup_fired: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct FaultyTx {
    inner: MemoryLedgerTransaction,
    fault: Fault,
    ledger_legs: usize,
}

#[async_trait]
impl LedgerStore for FaultyStore {
    type Tx = FaultyTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        if self.fault == Fault::Begin {
            return Err(StoreError::Unavailable("injected: pool exhausted".to_string()));
        }
        Ok(FaultyTx {
            inner: self.inner.begin().await?,
            fault: self.fault,
            ledger_legs: 0,
        })
    }

    async fn find_reward_id_by_idempotency_key(
        &self,
        user_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let lookup_fault = matches!(
            self.fault,
            Fault::IdempotencyLookup | Fault::BlindIdempotencyLookup
        );
        if lookup_fault && !self.lookup_fired.swap(true, Ordering::SeqCst) {
            return match self.fault {
                Fault::IdempotencyLookup => Err(injected("idempotency lookup")),
                _ => Ok(None),
            };
        }
        self.inner
            .find_reward_id_by_idempotency_key(user_id, idempotency_key)
            .await
    }

    async fn find_reward_event(&self, id: Uuid) -> Result<Option<RewardEvent>, StoreError> {
        self.inner.find_reward_event(id).await
    }

    async fn rewards_for_user(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        self.inner.rewards_for_user(user_id, from, to).await
    }

    async fn rewards_for_user_before(
        &self,
        user_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        self.inner.rewards_for_user_before(user_id, before).await
    }

    async fn ledger_entries_for_reward(
        &self,
        reward_event_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.ledger_entries_for_reward(reward_event_id).await
    }

    async fn holdings_for_user(&self, user_id: Uuid) -> Result<Vec<Holding>, StoreError> {
        self.inner.holdings_for_user(user_id).await
    }

    async fn holding(&self, user_id: Uuid, symbol: &str) -> Result<Option<Holding>, StoreError> {
        self.inner.holding(user_id, symbol).await
    }

    async fn distinct_reward_symbols(&self) -> Result<Vec<String>, StoreError> {
        self.inner.distinct_reward_symbols().await
    }

    async fn insert_price_observation(
        &self,
        symbol: &str,
        price: Money,
        fetched_at: DateTime<Utc>,
    ) -> Result<PriceObservation, StoreError> {
        self.inner
            .insert_price_observation(symbol, price, fetched_at)
            .await
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<PriceObservation>, StoreError> {
        self.inner.latest_price(symbol).await
    }

    async fn latest_price_in_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<PriceObservation>, StoreError> {
        self.inner.latest_price_in_range(symbol, from, to).await
    }
}

#[async_trait]
impl LedgerTransaction for FaultyTx {
    async fn insert_reward_event(
        &mut self,
        event: &NewRewardEvent,
    ) -> Result<RewardEvent, StoreError> {
        let inserted = self.inner.insert_reward_event(event).await?;
        if self.fault == Fault::InsertReward {
            return Err(injected("reward event insert"));
        }
        Ok(inserted)
    }

    async fn insert_ledger_entry(
        &mut self,
        entry: &NewLedgerEntry,
    ) -> Result<LedgerEntry, StoreError> {
        let leg = self.ledger_legs;
        self.ledger_legs += 1;
        if self.fault == Fault::LedgerEntry(leg) {
            return Err(injected("ledger entry insert"));
        }
        self.inner.insert_ledger_entry(entry).await
    }

    async fn upsert_holding(
        &mut self,
        user_id: Uuid,
        symbol: &str,
        quantity: Money,
    ) -> Result<Holding, StoreError> {
        if self.fault == Fault::UpsertHolding {
            return Err(injected("holdings upsert"));
        }
        self.inner.upsert_holding(user_id, symbol, quantity).await
    }

    async fn commit(self) -> Result<(), StoreError> {
        match self.fault {
            Fault::Commit => Err(injected("commit")),
            Fault::StallCommit => {
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => self.inner.commit().await,
        }
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

// ============================================================================
// Log capture
// ============================================================================

/// Collects formatted log lines written through `dispatch()`
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&self) -> Dispatch {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("log buffer");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Assertions
// ============================================================================

/// Assert that the reward's legs balance and carry the expected amounts
pub async fn assert_balanced_posting<S: LedgerStore>(store: &S, reward_event_id: Uuid) {
    let legs = store
        .ledger_entries_for_reward(reward_event_id)
        .await
        .expect("ledger entries");
    assert_eq!(legs.len(), 3, "a reward posts exactly three legs");

    let net = legs
        .iter()
        .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.net()))
        .expect("net in range");
    assert!(net.is_zero(), "debits and credits must balance, net {}", net);
}
