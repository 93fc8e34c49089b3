//! Request and result shapes for recording a reward.

use crate::money::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reward request as received from a caller. Amounts and timestamps are
/// strings so nothing is lost to floating point before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRequest {
    pub user_id: String,
    pub symbol: String,
    /// Positive decimal string
    pub quantity: String,
    /// RFC 3339 timestamp
    pub rewarded_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Fee components charged on a purchase, each rounded to 4 places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub brokerage: Money,
    pub stt: Money,
    pub gst: Money,
    pub total: Money,
}

/// A newly committed reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedReward {
    pub reward_event_id: Uuid,
    pub price: Money,
    pub cost: Money,
    pub fees: FeeBreakdown,
    pub total_fees: Money,
    pub total_outflow: Money,
    /// Set when the oracle failed and the reward was valued at zero
    pub price_unavailable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RewardOutcome {
    Recorded(RecordedReward),
    /// The idempotency key was already used by this user; nothing was written.
    AlreadyProcessed { reward_event_id: Uuid },
}

impl RewardOutcome {
    pub fn reward_event_id(&self) -> Uuid {
        match self {
            RewardOutcome::Recorded(recorded) => recorded.reward_event_id,
            RewardOutcome::AlreadyProcessed { reward_event_id } => *reward_event_id,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, RewardOutcome::Recorded(_))
    }

    pub fn recorded(&self) -> Option<&RecordedReward> {
        match self {
            RewardOutcome::Recorded(recorded) => Some(recorded),
            RewardOutcome::AlreadyProcessed { .. } => None,
        }
    }
}
