use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Current share balance of one user in one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Holding {
    pub user_id: Uuid,
    pub symbol: String,
    pub quantity: Money,
    pub last_updated: DateTime<Utc>,
}
