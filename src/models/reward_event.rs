use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A grant of `quantity` shares of `symbol` to a user. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RewardEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub quantity: Money,
    pub rewarded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a reward event; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRewardEvent {
    pub user_id: Uuid,
    pub symbol: String,
    pub quantity: Money,
    pub rewarded_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl NewRewardEvent {
    pub fn into_event(self, id: Uuid, created_at: DateTime<Utc>) -> RewardEvent {
        RewardEvent {
            id,
            user_id: self.user_id,
            symbol: self.symbol,
            quantity: self.quantity,
            rewarded_at: self.rewarded_at,
            idempotency_key: self.idempotency_key,
            created_at,
        }
    }
}
