//! PostgreSQL ledger store

use crate::error::StoreError;
use crate::models::{
    Holding, LedgerEntry, NewLedgerEntry, NewRewardEvent, PriceObservation, RewardEvent,
};
use crate::money::Money;
use crate::repositories::store::{LedgerStore, LedgerTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Open PostgreSQL transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgLedgerTransaction { tx })
    }

    async fn find_reward_id_by_idempotency_key(
        &self,
        user_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM reward_events
            WHERE idempotency_key = $1 AND user_id = $2
            "#,
        )
        .bind(idempotency_key)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_reward_event(&self, id: Uuid) -> Result<Option<RewardEvent>, StoreError> {
        let event = sqlx::query_as::<_, RewardEvent>(
            r#"
            SELECT id, user_id, symbol, quantity, rewarded_at, idempotency_key, created_at
            FROM reward_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn rewards_for_user(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let events = sqlx::query_as::<_, RewardEvent>(
            r#"
            SELECT id, user_id, symbol, quantity, rewarded_at, idempotency_key, created_at
            FROM reward_events
            WHERE user_id = $1 AND rewarded_at >= $2 AND rewarded_at < $3
            ORDER BY rewarded_at DESC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn rewards_for_user_before(
        &self,
        user_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let events = sqlx::query_as::<_, RewardEvent>(
            r#"
            SELECT id, user_id, symbol, quantity, rewarded_at, idempotency_key, created_at
            FROM reward_events
            WHERE user_id = $1 AND rewarded_at < $2
            ORDER BY rewarded_at DESC
            "#,
        )
        .bind(user_id)
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn ledger_entries_for_reward(
        &self,
        reward_event_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, reward_event_id, account, debit, credit, stock_symbol,
                   stock_quantity, notes, created_at
            FROM ledger_entries
            WHERE reward_event_id = $1
            ORDER BY created_at ASC, account ASC
            "#,
        )
        .bind(reward_event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn holdings_for_user(&self, user_id: Uuid) -> Result<Vec<Holding>, StoreError> {
        let holdings = sqlx::query_as::<_, Holding>(
            r#"
            SELECT user_id, symbol, quantity, last_updated
            FROM holdings_cache
            WHERE user_id = $1
            ORDER BY symbol ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(holdings)
    }

    async fn holding(&self, user_id: Uuid, symbol: &str) -> Result<Option<Holding>, StoreError> {
        let holding = sqlx::query_as::<_, Holding>(
            r#"
            SELECT user_id, symbol, quantity, last_updated
            FROM holdings_cache
            WHERE user_id = $1 AND symbol = $2
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(holding)
    }

    async fn distinct_reward_symbols(&self) -> Result<Vec<String>, StoreError> {
        let symbols = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT symbol FROM reward_events ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(symbols)
    }

    async fn insert_price_observation(
        &self,
        symbol: &str,
        price: Money,
        fetched_at: DateTime<Utc>,
    ) -> Result<PriceObservation, StoreError> {
        let observation = sqlx::query_as::<_, PriceObservation>(
            r#"
            INSERT INTO stock_prices (symbol, price, fetched_at)
            VALUES ($1, $2, $3)
            RETURNING id, symbol, price, fetched_at
            "#,
        )
        .bind(symbol)
        .bind(price)
        .bind(fetched_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(observation)
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<PriceObservation>, StoreError> {
        let observation = sqlx::query_as::<_, PriceObservation>(
            r#"
            SELECT id, symbol, price, fetched_at
            FROM stock_prices
            WHERE symbol = $1
            ORDER BY fetched_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(observation)
    }

    async fn latest_price_in_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<PriceObservation>, StoreError> {
        let observation = sqlx::query_as::<_, PriceObservation>(
            r#"
            SELECT id, symbol, price, fetched_at
            FROM stock_prices
            WHERE symbol = $1 AND fetched_at >= $2 AND fetched_at < $3
            ORDER BY fetched_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        Ok(observation)
    }
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn insert_reward_event(
        &mut self,
        event: &NewRewardEvent,
    ) -> Result<RewardEvent, StoreError> {
        let inserted = sqlx::query_as::<_, RewardEvent>(
            r#"
            INSERT INTO reward_events (id, user_id, symbol, quantity, rewarded_at, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, symbol, quantity, rewarded_at, idempotency_key, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.user_id)
        .bind(&event.symbol)
        .bind(event.quantity)
        .bind(event.rewarded_at)
        .bind(event.idempotency_key.as_deref())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(inserted)
    }

    async fn insert_ledger_entry(
        &mut self,
        entry: &NewLedgerEntry,
    ) -> Result<LedgerEntry, StoreError> {
        let inserted = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries
            (id, reward_event_id, account, debit, credit, stock_symbol, stock_quantity, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, reward_event_id, account, debit, credit, stock_symbol,
                      stock_quantity, notes, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.reward_event_id)
        .bind(&entry.account)
        .bind(entry.debit)
        .bind(entry.credit)
        .bind(entry.stock_symbol.as_deref())
        .bind(entry.stock_quantity)
        .bind(entry.notes.as_deref())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(inserted)
    }

    async fn upsert_holding(
        &mut self,
        user_id: Uuid,
        symbol: &str,
        quantity: Money,
    ) -> Result<Holding, StoreError> {
        // Single statement: the row lock taken by ON CONFLICT serializes
        // concurrent increments on the same (user_id, symbol).
        let holding = sqlx::query_as::<_, Holding>(
            r#"
            INSERT INTO holdings_cache (user_id, symbol, quantity, last_updated)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, symbol) DO UPDATE
            SET quantity = holdings_cache.quantity + EXCLUDED.quantity, last_updated = NOW()
            RETURNING user_id, symbol, quantity, last_updated
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .bind(quantity)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(holding)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
