//! Domain models for the reward ledger.
//!
//! Row types mirror the four tables (reward events, ledger entries,
//! holdings cache, price observations); `reward` holds the request and
//! result shapes of the recording operation.

pub mod holding;
pub mod ledger_entry;
pub mod price_observation;
pub mod reward;
pub mod reward_event;

// Re-export all models for convenient access
pub use holding::Holding;
pub use ledger_entry::{accounts, LedgerEntry, NewLedgerEntry};
pub use price_observation::PriceObservation;
pub use reward::{FeeBreakdown, RecordedReward, RewardOutcome, RewardRequest};
pub use reward_event::{NewRewardEvent, RewardEvent};
