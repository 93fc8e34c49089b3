//! Decimal amounts for prices, share quantities and INR values.
//!
//! Every amount that crosses a boundary (request, database row, response) is
//! carried as a decimal string. `Money` never goes through `f64`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits used for fees and valuations.
pub const REPORTING_SCALE: u32 = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount overflow: {0}")]
    Overflow(String),
}

/// Signed arbitrary-precision decimal amount.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Parse a decimal string, rejecting anything that is not a plain
    /// decimal literal or that would lose precision.
    pub fn parse(input: &str) -> Result<Self, MoneyError> {
        if input.is_empty() {
            return Err(MoneyError::InvalidAmount("empty amount".to_string()));
        }
        Decimal::from_str_exact(input)
            .map(Self)
            .map_err(|e| MoneyError::InvalidAmount(format!("{:?}: {}", input, e)))
    }

    /// Parse an amount that must be strictly greater than zero.
    pub fn parse_positive(input: &str) -> Result<Self, MoneyError> {
        let amount = Self::parse(input)?;
        if !amount.is_positive() {
            return Err(MoneyError::InvalidAmount(format!(
                "{:?}: must be greater than zero",
                input
            )));
        }
        Ok(amount)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Round half away from zero to `scale` places and pad to exactly that
    /// many fractional digits, so `2.6` renders as `2.6000` at scale 4.
    pub fn round_to(&self, scale: u32) -> Self {
        let mut rounded = self
            .0
            .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(scale);
        Self(rounded)
    }

    /// Round to the fee/valuation reporting scale.
    pub fn round4(&self) -> Self {
        self.round_to(REPORTING_SCALE)
    }

    /// `self + rhs`, or `Overflow` past the 96-bit decimal range.
    pub fn checked_add(&self, rhs: Money) -> Result<Self, MoneyError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| MoneyError::Overflow(format!("{} + {}", self.0, rhs.0)))
    }

    /// `self * rhs`, or `Overflow` past the 96-bit decimal range.
    pub fn checked_mul(&self, rhs: Money) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(rhs.0)
            .map(Self)
            .ok_or_else(|| MoneyError::Overflow(format!("{} * {}", self.0, rhs.0)))
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
