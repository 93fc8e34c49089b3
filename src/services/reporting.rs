//! Read-only projections over the ledger: today's rewards, stats, portfolio
//! value and day-by-day historical value.
//!
//! Days are UTC calendar days. Historical value for a day uses the latest
//! price observed during that day, falling back to the latest observation
//! overall, and zero when the symbol was never priced.

use crate::error::StoreError;
use crate::models::RewardEvent;
use crate::money::{Money, MoneyError};
use crate::repositories::LedgerStore;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldingValuation {
    pub symbol: String,
    pub quantity: Money,
    pub price: Money,
    pub value_inr: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioValuation {
    pub total_inr: Money,
    pub holdings: Vec<HoldingValuation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolQuantity {
    pub symbol: String,
    pub quantity: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub shares_rewarded_today: Vec<SymbolQuantity>,
    pub portfolio: PortfolioValuation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyValuation {
    pub day: NaiveDate,
    pub symbol: String,
    pub quantity: Money,
    pub price: Money,
    pub value_inr: Money,
}

fn valuation_overflow(err: MoneyError) -> StoreError {
    StoreError::Failure(format!("valuation out of range: {}", err))
}

/// `price * quantity` at reporting scale
fn value_of(price: Money, quantity: Money) -> Result<Money, StoreError> {
    price
        .checked_mul(quantity)
        .map(|v| v.round4())
        .map_err(valuation_overflow)
}

/// `[start, end)` of a UTC calendar day
pub fn utc_day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}

pub struct ReportingService<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> ReportingService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Rewards granted during the UTC day containing `now`, newest first
    pub async fn todays_rewards(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let (start, end) = utc_day_bounds(now.date_naive());
        self.store.rewards_for_user(user_id, start, end).await
    }

    /// Current holdings valued at the latest observed price
    pub async fn portfolio(&self, user_id: Uuid) -> Result<PortfolioValuation, StoreError> {
        let holdings = self.store.holdings_for_user(user_id).await?;

        let mut valued = Vec::with_capacity(holdings.len());
        for holding in holdings {
            let price = self
                .store
                .latest_price(&holding.symbol)
                .await?
                .map(|p| p.price)
                .unwrap_or(Money::ZERO);
            valued.push(HoldingValuation {
                value_inr: value_of(price, holding.quantity)?,
                symbol: holding.symbol,
                quantity: holding.quantity,
                price,
            });
        }

        let total_inr = valued
            .iter()
            .try_fold(Money::ZERO, |acc, h| acc.checked_add(h.value_inr))
            .map_err(valuation_overflow)?
            .round4();
        Ok(PortfolioValuation {
            total_inr,
            holdings: valued,
        })
    }

    /// Shares rewarded today per symbol, plus the current portfolio value
    pub async fn stats(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<UserStats, StoreError> {
        let today = self.todays_rewards(user_id, now).await?;

        let mut per_symbol: BTreeMap<String, Money> = BTreeMap::new();
        for event in today {
            let total = per_symbol.entry(event.symbol).or_insert(Money::ZERO);
            *total = total.checked_add(event.quantity).map_err(valuation_overflow)?;
        }

        Ok(UserStats {
            shares_rewarded_today: per_symbol
                .into_iter()
                .map(|(symbol, quantity)| SymbolQuantity { symbol, quantity })
                .collect(),
            portfolio: self.portfolio(user_id).await?,
        })
    }

    /// Value of each day's rewards for every UTC day before today, newest
    /// day first and symbols in order within a day.
    pub async fn historical_valuation(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailyValuation>, StoreError> {
        let (today_start, _) = utc_day_bounds(now.date_naive());
        let events = self
            .store
            .rewards_for_user_before(user_id, today_start)
            .await?;

        let mut per_day: BTreeMap<(NaiveDate, String), Money> = BTreeMap::new();
        for event in events {
            let total = per_day
                .entry((event.rewarded_at.date_naive(), event.symbol))
                .or_insert(Money::ZERO);
            *total = total.checked_add(event.quantity).map_err(valuation_overflow)?;
        }

        // Newest day first, symbols ascending within a day
        let mut rows: Vec<((NaiveDate, String), Money)> = per_day.into_iter().collect();
        rows.sort_by(|((da, sa), _), ((db, sb), _)| db.cmp(da).then_with(|| sa.cmp(sb)));

        let mut valuations = Vec::with_capacity(rows.len());
        for ((day, symbol), quantity) in rows {
            let price = self.price_for_day(&symbol, day).await?;
            valuations.push(DailyValuation {
                day,
                value_inr: value_of(price, quantity)?,
                symbol,
                quantity,
                price,
            });
        }
        Ok(valuations)
    }

    async fn price_for_day(&self, symbol: &str, day: NaiveDate) -> Result<Money, StoreError> {
        let (start, end) = utc_day_bounds(day);
        if let Some(observation) = self.store.latest_price_in_range(symbol, start, end).await? {
            return Ok(observation.price);
        }
        Ok(self
            .store
            .latest_price(symbol)
            .await?
            .map(|p| p.price)
            .unwrap_or(Money::ZERO))
    }
}
