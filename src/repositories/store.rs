//! Ledger store contract.
//!
//! A store hands out transactions scoped to one logical operation. A
//! transaction that is dropped without `commit` is rolled back, so every exit
//! path of a caller (error, early return, cancellation, panic) releases its
//! effects without an explicit cleanup branch.
//!
//! Implementations must enforce uniqueness of `(idempotency_key, user_id)` on
//! reward events and of `(user_id, symbol)` on holdings themselves, and must
//! apply `upsert_holding` as a single atomic increment.

use crate::error::StoreError;
use crate::models::{
    Holding, LedgerEntry, NewLedgerEntry, NewRewardEvent, PriceObservation, RewardEvent,
};
use crate::money::Money;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTransaction;

    /// Open a transaction. Fails with `StoreError::Unavailable` when no
    /// connection can be obtained in time.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn find_reward_id_by_idempotency_key(
        &self,
        user_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Uuid>, StoreError>;

    async fn find_reward_event(&self, id: Uuid) -> Result<Option<RewardEvent>, StoreError>;

    /// Rewards with `from <= rewarded_at < to`, newest first.
    async fn rewards_for_user(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError>;

    /// Rewards with `rewarded_at < before`, newest first.
    async fn rewards_for_user_before(
        &self,
        user_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError>;

    async fn ledger_entries_for_reward(
        &self,
        reward_event_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn holdings_for_user(&self, user_id: Uuid) -> Result<Vec<Holding>, StoreError>;

    async fn holding(&self, user_id: Uuid, symbol: &str) -> Result<Option<Holding>, StoreError>;

    /// Every symbol that has at least one committed reward
    async fn distinct_reward_symbols(&self) -> Result<Vec<String>, StoreError>;

    async fn insert_price_observation(
        &self,
        symbol: &str,
        price: Money,
        fetched_at: DateTime<Utc>,
    ) -> Result<PriceObservation, StoreError>;

    async fn latest_price(&self, symbol: &str) -> Result<Option<PriceObservation>, StoreError>;

    /// Most recent observation with `from <= fetched_at < to`
    async fn latest_price_in_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<PriceObservation>, StoreError>;
}

/// Write side of a single logical operation.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Fails with `StoreError::Duplicate` when the `(idempotency_key, user_id)`
    /// pair is already taken by a committed event.
    async fn insert_reward_event(
        &mut self,
        event: &NewRewardEvent,
    ) -> Result<RewardEvent, StoreError>;

    async fn insert_ledger_entry(
        &mut self,
        entry: &NewLedgerEntry,
    ) -> Result<LedgerEntry, StoreError>;

    /// Insert the holding with `quantity` or add `quantity` to the existing
    /// balance, refreshing `last_updated`.
    async fn upsert_holding(
        &mut self,
        user_id: Uuid,
        symbol: &str,
        quantity: Money,
    ) -> Result<Holding, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
