use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Price sample recorded by the refresh job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PriceObservation {
    pub id: i64,
    pub symbol: String,
    pub price: Money,
    pub fetched_at: DateTime<Utc>,
}
