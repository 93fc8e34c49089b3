//! Reward recording: validation, idempotency, pricing and the atomic write of
//! reward event, ledger legs and holdings increment.
//!
//! The write sequence runs inside one store transaction acquired by `write`.
//! Every early return drops the transaction handle, which rolls it back, so
//! there is a single finalizer for success, error and cancellation alike.
//!
//! Idempotency is checked twice. The pre-check read is best effort: if it
//! fails for any reason other than "not found" the engine logs and carries
//! on, because the store's unique index on `(idempotency_key, user_id)` is
//! the authority. A duplicate reported by that index while inserting the
//! reward event (two requests racing past the pre-check) is answered with
//! the same `AlreadyProcessed` outcome the pre-check would have produced.

use crate::error::{PriceError, RewardError, StoreError};
use crate::models::{
    NewLedgerEntry, NewRewardEvent, RecordedReward, RewardEvent, RewardOutcome, RewardRequest,
};
use crate::money::Money;
use crate::repositories::{LedgerStore, LedgerTransaction};
use crate::services::fees::{self, PurchaseCosting};
use crate::services::price_oracle::PriceOracle;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, info_span, warn, Dispatch, Instrument};
use uuid::Uuid;

const DEFAULT_PRICE_TIMEOUT: Duration = Duration::from_secs(2);

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReward {
    pub user_id: Uuid,
    pub symbol: String,
    pub quantity: Money,
    pub rewarded_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl ValidatedReward {
    fn to_new_event(&self) -> NewRewardEvent {
        NewRewardEvent {
            user_id: self.user_id,
            symbol: self.symbol.clone(),
            quantity: self.quantity,
            rewarded_at: self.rewarded_at,
            idempotency_key: self.idempotency_key.clone(),
        }
    }
}

/// Check a raw request without touching the store.
pub fn validate_request(request: &RewardRequest) -> Result<ValidatedReward, RewardError> {
    let quantity = Money::parse_positive(&request.quantity)
        .map_err(|e| RewardError::InvalidQuantity(e.to_string()))?;

    let rewarded_at = DateTime::parse_from_rfc3339(&request.rewarded_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            RewardError::InvalidTimestamp(format!(
                "{:?} is not an RFC 3339 timestamp: {}",
                request.rewarded_at, e
            ))
        })?;

    if request.user_id.trim().is_empty() {
        return Err(RewardError::InvalidInput("user_id is required".to_string()));
    }
    let user_id = Uuid::parse_str(request.user_id.trim()).map_err(|e| {
        RewardError::InvalidInput(format!("user_id {:?} is not a UUID: {}", request.user_id, e))
    })?;

    let symbol = request.symbol.trim();
    if symbol.is_empty() {
        return Err(RewardError::InvalidInput("symbol is required".to_string()));
    }

    // Only a blank key counts as absent; other keys are kept byte for byte.
    let idempotency_key = request
        .idempotency_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .map(str::to_string);

    Ok(ValidatedReward {
        user_id,
        symbol: symbol.to_string(),
        quantity,
        rewarded_at,
        idempotency_key,
    })
}

/// Records reward events against a ledger store.
pub struct RewardEngine<S: LedgerStore> {
    store: Arc<S>,
    oracle: Arc<dyn PriceOracle>,
    price_timeout: Duration,
    dispatch: Option<Dispatch>,
}

impl<S: LedgerStore> RewardEngine<S> {
    pub fn new(store: Arc<S>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            store,
            oracle,
            price_timeout: DEFAULT_PRICE_TIMEOUT,
            dispatch: None,
        }
    }

    /// Bound on the oracle call; a slower oracle is treated as unavailable.
    pub fn with_price_timeout(mut self, timeout: Duration) -> Self {
        self.price_timeout = timeout;
        self
    }

    /// Route this engine's logs to `dispatch` instead of the caller's
    /// current subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Record one reward.
    ///
    /// Returns `Recorded` for a new reward, `AlreadyProcessed` when the
    /// user already used the idempotency key. On error nothing from this
    /// call is left in the store.
    pub async fn record_reward(&self, request: RewardRequest) -> Result<RewardOutcome, RewardError> {
        let work = async {
            let span = info_span!(
                "record_reward",
                user_id = %request.user_id,
                symbol = %request.symbol
            );
            self.process(&request).instrument(span).await
        };

        match &self.dispatch {
            Some(dispatch) => work.with_subscriber(dispatch.clone()).await,
            None => work.await,
        }
    }

    async fn process(&self, request: &RewardRequest) -> Result<RewardOutcome, RewardError> {
        let reward = validate_request(request).map_err(|e| {
            info!(error = %e, "rejected reward request");
            e
        })?;

        if let Some(key) = reward.idempotency_key.as_deref() {
            match self
                .store
                .find_reward_id_by_idempotency_key(reward.user_id, key)
                .await
            {
                Ok(Some(existing)) => {
                    info!(reward_event_id = %existing, "idempotency key already processed");
                    return Ok(RewardOutcome::AlreadyProcessed {
                        reward_event_id: existing,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "idempotency pre-check failed, relying on unique constraint");
                }
            }
        }

        // Priced before the transaction opens so no lock is held across the oracle call.
        let (price, price_unavailable) = self.fetch_price(&reward.symbol).await;
        let costing = fees::compute(price, reward.quantity).map_err(|e| {
            info!(error = %e, "rejected reward request");
            RewardError::InvalidQuantity(format!("{} is too large to price: {}", reward.quantity, e))
        })?;

        match self.write(&reward, &costing).await {
            Ok(event) => {
                info!(
                    reward_event_id = %event.id,
                    quantity = %reward.quantity,
                    cost = %costing.cost,
                    total_fees = %costing.fees.total,
                    total_outflow = %costing.total_outflow,
                    price_unavailable,
                    "reward recorded"
                );
                Ok(RewardOutcome::Recorded(RecordedReward {
                    reward_event_id: event.id,
                    price,
                    cost: costing.cost,
                    fees: costing.fees,
                    total_fees: costing.fees.total,
                    total_outflow: costing.total_outflow,
                    price_unavailable,
                }))
            }
            Err(StoreError::Duplicate(detail)) if reward.idempotency_key.is_some() => {
                debug!(%detail, "idempotency key claimed concurrently");
                self.resolve_duplicate(&reward).await
            }
            Err(e) => {
                error!(error = %e, "reward transaction rolled back");
                Err(e.into())
            }
        }
    }

    /// Oracle price for `symbol`, or zero when the oracle fails or is too slow.
    async fn fetch_price(&self, symbol: &str) -> (Money, bool) {
        match tokio::time::timeout(self.price_timeout, self.oracle.current_price(symbol)).await {
            Ok(Ok(price)) => (price, false),
            Ok(Err(e)) => {
                warn!(error = %e, "price oracle unavailable, recording reward at zero price");
                (Money::ZERO, true)
            }
            Err(_) => {
                let e = PriceError::Timeout(symbol.to_string());
                warn!(
                    error = %e,
                    timeout_ms = self.price_timeout.as_millis() as u64,
                    "price oracle timed out, recording reward at zero price"
                );
                (Money::ZERO, true)
            }
        }
    }

    async fn write(
        &self,
        reward: &ValidatedReward,
        costing: &PurchaseCosting,
    ) -> Result<RewardEvent, StoreError> {
        let mut tx = self.store.begin().await?;

        let event = tx.insert_reward_event(&reward.to_new_event()).await?;

        tx.insert_ledger_entry(&NewLedgerEntry::stock_asset(
            event.id,
            &reward.symbol,
            reward.quantity,
            costing.cost,
        ))
        .await?;
        tx.insert_ledger_entry(&NewLedgerEntry::cash_outflow(event.id, costing.total_outflow))
            .await?;
        tx.insert_ledger_entry(&NewLedgerEntry::fee_expense(event.id, costing.fees.total))
            .await?;

        let holding = tx
            .upsert_holding(reward.user_id, &reward.symbol, reward.quantity)
            .await?;
        debug!(holding_quantity = %holding.quantity, "holdings updated");

        tx.commit().await?;
        Ok(event)
    }

    async fn resolve_duplicate(&self, reward: &ValidatedReward) -> Result<RewardOutcome, RewardError> {
        let key = reward.idempotency_key.as_deref().unwrap_or_default();
        match self
            .store
            .find_reward_id_by_idempotency_key(reward.user_id, key)
            .await
        {
            Ok(Some(existing)) => {
                info!(reward_event_id = %existing, "idempotency key already processed");
                Ok(RewardOutcome::AlreadyProcessed {
                    reward_event_id: existing,
                })
            }
            Ok(None) => Err(RewardError::TransactionFailed(
                "idempotency key conflict but the existing reward is not visible".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}
