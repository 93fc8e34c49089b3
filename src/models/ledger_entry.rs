//! Double-entry legs posted for each reward event.

use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account names used by the reward posting.
pub mod accounts {
    pub const COMPANY_CASH: &str = "company_cash";
    pub const FEE_EXPENSE: &str = "fee_expense";
    pub const STOCK_PREFIX: &str = "company_stock_";

    /// Asset account holding shares of `symbol`
    pub fn stock(symbol: &str) -> String {
        format!("{}{}", STOCK_PREFIX, symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub reward_event_id: Option<Uuid>,
    pub account: String,
    pub debit: Money,
    pub credit: Money,
    pub stock_symbol: Option<String>,
    pub stock_quantity: Option<Money>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed INR effect of the leg (debit minus credit)
    pub fn net(&self) -> Money {
        Money::new(self.debit.as_decimal() - self.credit.as_decimal())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub reward_event_id: Option<Uuid>,
    pub account: String,
    pub debit: Money,
    pub credit: Money,
    pub stock_symbol: Option<String>,
    pub stock_quantity: Option<Money>,
    pub notes: Option<String>,
}

impl NewLedgerEntry {
    /// Shares acquired on behalf of the user, valued at `cost`.
    /// This INR debit, with the fee debit, balances the cash credit.
    pub fn stock_asset(reward_event_id: Uuid, symbol: &str, quantity: Money, cost: Money) -> Self {
        Self {
            reward_event_id: Some(reward_event_id),
            account: accounts::stock(symbol),
            debit: cost,
            credit: Money::ZERO,
            stock_symbol: Some(symbol.to_string()),
            stock_quantity: Some(quantity),
            notes: Some("stock acquired for reward".to_string()),
        }
    }

    /// Cash paid out for the purchase including fees.
    pub fn cash_outflow(reward_event_id: Uuid, total_outflow: Money) -> Self {
        Self {
            reward_event_id: Some(reward_event_id),
            account: accounts::COMPANY_CASH.to_string(),
            debit: Money::ZERO,
            credit: total_outflow,
            stock_symbol: None,
            stock_quantity: None,
            notes: Some("cash outflow for stock purchase".to_string()),
        }
    }

    pub fn fee_expense(reward_event_id: Uuid, total_fees: Money) -> Self {
        Self {
            reward_event_id: Some(reward_event_id),
            account: accounts::FEE_EXPENSE.to_string(),
            debit: total_fees,
            credit: Money::ZERO,
            stock_symbol: None,
            stock_quantity: None,
            notes: Some("brokerage+stt+gst".to_string()),
        }
    }

    pub fn into_entry(self, id: Uuid, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            reward_event_id: self.reward_event_id,
            account: self.account,
            debit: self.debit,
            credit: self.credit,
            stock_symbol: self.stock_symbol,
            stock_quantity: self.stock_quantity,
            notes: self.notes,
            created_at,
        }
    }
}
