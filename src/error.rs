use crate::database::DatabaseError;
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pool creation and migration errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Ledger store errors outside the reward path
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Reward recording errors
    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),

    /// Price oracle errors
    #[error("Price error: {0}")]
    Price(#[from] PriceError),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Reward(e) if e.is_validation() => 400,
            AppError::Reward(e) if e.is_retryable() => 503,
            AppError::Store(StoreError::Unavailable(_)) => 503,
            AppError::Store(StoreError::NotFound(_)) => 404,
            AppError::Price(_) => 502,
            _ => 500,
        }
    }
}

/// Errors raised by a ledger store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Foreign key or check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Connection pool exhausted, timed out or closed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Backend failure that is not a SQL error
    #[error("Store failure: {0}")]
    Failure(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

impl From<SqlxError> for StoreError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => StoreError::NotFound("Record not found".to_string()),
            SqlxError::PoolTimedOut => {
                StoreError::Unavailable("timed out acquiring a connection".to_string())
            }
            SqlxError::PoolClosed => StoreError::Unavailable("connection pool closed".to_string()),
            SqlxError::Io(io_err) => StoreError::Unavailable(io_err.to_string()),
            SqlxError::Database(db_err) => {
                // PostgreSQL SQLSTATE codes
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    Some("23505") => StoreError::Duplicate(db_err.message().to_string()),
                    Some("23503") | Some("23514") => {
                        StoreError::ConstraintViolation(db_err.message().to_string())
                    }
                    _ => StoreError::Query(err),
                }
            }
            _ => StoreError::Query(err),
        }
    }
}

/// Failures of the reward recording operation.
///
/// Validation variants are raised before any transaction opens. The
/// infrastructure variants always come with a full rollback and are safe
/// to retry with the same idempotency key.
#[derive(Error, Debug)]
pub enum RewardError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

impl RewardError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RewardError::InvalidQuantity(_)
                | RewardError::InvalidTimestamp(_)
                | RewardError::InvalidInput(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RewardError::StoreUnavailable(_) | RewardError::TransactionFailed(_)
        )
    }
}

impl From<StoreError> for RewardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => RewardError::StoreUnavailable(msg),
            other => RewardError::TransactionFailed(other.to_string()),
        }
    }
}

/// Price oracle errors
#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Price unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },

    #[error("Price fetch for {0} timed out")]
    Timeout(String),

    #[error("Failed to persist price observation: {0}")]
    Store(#[from] StoreError),
}
