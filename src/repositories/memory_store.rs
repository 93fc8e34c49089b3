//! In-process ledger store.
//!
//! Mirrors the PostgreSQL constraint semantics closely enough to run the
//! engine without a database: writes are buffered per transaction and
//! applied under one lock at commit, an idempotency key reserved by an open
//! transaction blocks other writers until that transaction finishes (the
//! way a unique index does), and a bounded permit pool stands in for the
//! connection pool.

use crate::error::StoreError;
use crate::models::{
    Holding, LedgerEntry, NewLedgerEntry, NewRewardEvent, PriceObservation, RewardEvent,
};
use crate::money::{Money, MoneyError};
use crate::repositories::store::{LedgerStore, LedgerTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

const DEFAULT_MAX_CONNECTIONS: usize = 20;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

type KeySlot = (Uuid, String);

#[derive(Default)]
struct State {
    rewards: Vec<RewardEvent>,
    ledger: Vec<LedgerEntry>,
    holdings: BTreeMap<(Uuid, String), Holding>,
    prices: Vec<PriceObservation>,
    next_price_id: i64,
    /// Keys inserted by transactions that have not finished yet
    pending_keys: HashMap<KeySlot, watch::Receiver<()>>,
}

impl State {
    fn key_committed(&self, slot: &KeySlot) -> bool {
        self.rewards
            .iter()
            .any(|r| r.user_id == slot.0 && r.idempotency_key.as_deref() == Some(slot.1.as_str()))
    }
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub reward_events: usize,
    pub ledger_entries: usize,
    pub holdings: usize,
    pub price_observations: usize,
}

#[derive(Clone)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<State>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_pool_limits(DEFAULT_MAX_CONNECTIONS, DEFAULT_ACQUIRE_TIMEOUT)
    }

    /// At most `max_connections` transactions may be open at once; `begin`
    /// gives up with `StoreError::Unavailable` after `acquire_timeout`.
    pub fn with_pool_limits(max_connections: usize, acquire_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            permits: Arc::new(Semaphore::new(max_connections)),
            acquire_timeout,
        }
    }

    pub fn table_counts(&self) -> TableCounts {
        let state = lock(&self.state);
        TableCounts {
            reward_events: state.rewards.len(),
            ledger_entries: state.ledger.len(),
            holdings: state.holdings.len(),
            price_observations: state.prices.len(),
        }
    }

    pub fn all_reward_events(&self) -> Vec<RewardEvent> {
        lock(&self.state).rewards.clone()
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

enum Reservation {
    Acquired(watch::Sender<()>),
    Wait(watch::Receiver<()>),
}

#[derive(Default)]
struct PendingWrites {
    rewards: Vec<RewardEvent>,
    ledger: Vec<LedgerEntry>,
    holdings: Vec<(Uuid, String, Money)>,
}

pub struct MemoryLedgerTransaction {
    state: Arc<Mutex<State>>,
    writes: PendingWrites,
    reserved: Vec<(KeySlot, watch::Sender<()>)>,
    _permit: OwnedSemaphorePermit,
}

impl MemoryLedgerTransaction {
    fn reserve(&self, slot: &KeySlot) -> Result<Reservation, StoreError> {
        let mut state = lock(&self.state);
        if state.key_committed(slot) || self.reserved.iter().any(|(s, _)| s == slot) {
            return Err(duplicate_key(slot));
        }
        if let Some(waiter) = state.pending_keys.get(slot) {
            return Ok(Reservation::Wait(waiter.clone()));
        }
        let (sender, receiver) = watch::channel(());
        state.pending_keys.insert(slot.clone(), receiver);
        Ok(Reservation::Acquired(sender))
    }

    /// Drop key reservations; waiting writers wake once the senders go away.
    fn release(&mut self) {
        if self.reserved.is_empty() {
            return;
        }
        {
            let mut state = lock(&self.state);
            for (slot, _) in &self.reserved {
                state.pending_keys.remove(slot);
            }
        }
        self.reserved.clear();
    }

    /// Committed quantity plus this transaction's pending increments
    fn projected_quantity(
        &self,
        state: &State,
        user_id: Uuid,
        symbol: &str,
    ) -> Result<Money, StoreError> {
        let committed = state
            .holdings
            .get(&(user_id, symbol.to_string()))
            .map(|h| h.quantity)
            .unwrap_or(Money::ZERO);
        self.writes
            .holdings
            .iter()
            .filter(|(u, s, _)| *u == user_id && s == symbol)
            .try_fold(committed, |acc, (_, _, q)| acc.checked_add(*q))
            .map_err(holding_overflow)
    }
}

fn holding_overflow(err: MoneyError) -> StoreError {
    StoreError::ConstraintViolation(format!("holding quantity out of range: {}", err))
}

fn duplicate_key(slot: &KeySlot) -> StoreError {
    StoreError::Duplicate(format!(
        "idempotency key {:?} already used by user {}",
        slot.1, slot.0
    ))
}

impl Drop for MemoryLedgerTransaction {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryLedgerTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| StoreError::Unavailable("timed out acquiring a connection".to_string()))?
            .map_err(|_| StoreError::Unavailable("connection pool closed".to_string()))?;

        Ok(MemoryLedgerTransaction {
            state: self.state.clone(),
            writes: PendingWrites::default(),
            reserved: Vec::new(),
            _permit: permit,
        })
    }

    async fn find_reward_id_by_idempotency_key(
        &self,
        user_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .rewards
            .iter()
            .find(|r| r.user_id == user_id && r.idempotency_key.as_deref() == Some(idempotency_key))
            .map(|r| r.id))
    }

    async fn find_reward_event(&self, id: Uuid) -> Result<Option<RewardEvent>, StoreError> {
        let state = lock(&self.state);
        Ok(state.rewards.iter().find(|r| r.id == id).cloned())
    }

    async fn rewards_for_user(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let state = lock(&self.state);
        let mut events: Vec<RewardEvent> = state
            .rewards
            .iter()
            .filter(|r| r.user_id == user_id && r.rewarded_at >= from && r.rewarded_at < to)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.rewarded_at.cmp(&a.rewarded_at));
        Ok(events)
    }

    async fn rewards_for_user_before(
        &self,
        user_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let state = lock(&self.state);
        let mut events: Vec<RewardEvent> = state
            .rewards
            .iter()
            .filter(|r| r.user_id == user_id && r.rewarded_at < before)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.rewarded_at.cmp(&a.rewarded_at));
        Ok(events)
    }

    async fn ledger_entries_for_reward(
        &self,
        reward_event_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.reward_event_id == Some(reward_event_id))
            .cloned()
            .collect())
    }

    async fn holdings_for_user(&self, user_id: Uuid) -> Result<Vec<Holding>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .holdings
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn holding(&self, user_id: Uuid, symbol: &str) -> Result<Option<Holding>, StoreError> {
        let state = lock(&self.state);
        Ok(state.holdings.get(&(user_id, symbol.to_string())).cloned())
    }

    async fn distinct_reward_symbols(&self) -> Result<Vec<String>, StoreError> {
        let state = lock(&self.state);
        let symbols: BTreeSet<String> = state.rewards.iter().map(|r| r.symbol.clone()).collect();
        Ok(symbols.into_iter().collect())
    }

    async fn insert_price_observation(
        &self,
        symbol: &str,
        price: Money,
        fetched_at: DateTime<Utc>,
    ) -> Result<PriceObservation, StoreError> {
        if price.as_decimal().is_sign_negative() && !price.is_zero() {
            return Err(StoreError::ConstraintViolation(format!(
                "negative price {} for {}",
                price, symbol
            )));
        }
        let mut state = lock(&self.state);
        state.next_price_id += 1;
        let observation = PriceObservation {
            id: state.next_price_id,
            symbol: symbol.to_string(),
            price,
            fetched_at,
        };
        state.prices.push(observation.clone());
        Ok(observation)
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<PriceObservation>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .prices
            .iter()
            .filter(|p| p.symbol == symbol)
            .max_by_key(|p| (p.fetched_at, p.id))
            .cloned())
    }

    async fn latest_price_in_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<PriceObservation>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .prices
            .iter()
            .filter(|p| p.symbol == symbol && p.fetched_at >= from && p.fetched_at < to)
            .max_by_key(|p| (p.fetched_at, p.id))
            .cloned())
    }
}

#[async_trait]
impl LedgerTransaction for MemoryLedgerTransaction {
    async fn insert_reward_event(
        &mut self,
        event: &NewRewardEvent,
    ) -> Result<RewardEvent, StoreError> {
        if !event.quantity.is_positive() {
            return Err(StoreError::ConstraintViolation(
                "reward quantity must be positive".to_string(),
            ));
        }

        if let Some(key) = &event.idempotency_key {
            let slot = (event.user_id, key.clone());
            loop {
                match self.reserve(&slot)? {
                    Reservation::Acquired(sender) => {
                        self.reserved.push((slot, sender));
                        break;
                    }
                    Reservation::Wait(mut waiter) => {
                        // Resolves when the other transaction commits or rolls back.
                        let _ = waiter.changed().await;
                    }
                }
            }
        }

        let inserted = event.clone().into_event(Uuid::new_v4(), Utc::now());
        self.writes.rewards.push(inserted.clone());
        Ok(inserted)
    }

    async fn insert_ledger_entry(
        &mut self,
        entry: &NewLedgerEntry,
    ) -> Result<LedgerEntry, StoreError> {
        if let Some(reward_id) = entry.reward_event_id {
            let known = self.writes.rewards.iter().any(|r| r.id == reward_id)
                || lock(&self.state).rewards.iter().any(|r| r.id == reward_id);
            if !known {
                return Err(StoreError::ConstraintViolation(format!(
                    "ledger entry references unknown reward event {}",
                    reward_id
                )));
            }
        }

        let inserted = entry.clone().into_entry(Uuid::new_v4(), Utc::now());
        self.writes.ledger.push(inserted.clone());
        Ok(inserted)
    }

    async fn upsert_holding(
        &mut self,
        user_id: Uuid,
        symbol: &str,
        quantity: Money,
    ) -> Result<Holding, StoreError> {
        let projected = {
            let state = lock(&self.state);
            self.projected_quantity(&state, user_id, symbol)?
                .checked_add(quantity)
                .map_err(holding_overflow)?
        };
        self.writes
            .holdings
            .push((user_id, symbol.to_string(), quantity));

        Ok(Holding {
            user_id,
            symbol: symbol.to_string(),
            quantity: projected,
            last_updated: Utc::now(),
        })
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let writes = std::mem::take(&mut self.writes);
        {
            let mut state = lock(&self.state);
            let now = Utc::now();

            // Resolve every increment before touching state so an overflow
            // applies nothing.
            let mut totals: BTreeMap<(Uuid, String), Money> = BTreeMap::new();
            for (user_id, symbol, quantity) in writes.holdings {
                let key = (user_id, symbol);
                let current = match totals.get(&key) {
                    Some(total) => *total,
                    None => state.holdings.get(&key).map(|h| h.quantity).unwrap_or(Money::ZERO),
                };
                let updated = current.checked_add(quantity).map_err(holding_overflow)?;
                totals.insert(key, updated);
            }

            state.rewards.extend(writes.rewards);
            state.ledger.extend(writes.ledger);
            for ((user_id, symbol), quantity) in totals {
                state.holdings.insert(
                    (user_id, symbol.clone()),
                    Holding {
                        user_id,
                        symbol,
                        quantity,
                        last_updated: now,
                    },
                );
            }
        }
        self.release();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.writes = PendingWrites::default();
        self.release();
        Ok(())
    }
}
