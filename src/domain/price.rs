//! Price type
//!
//! Domain primitives for the unit price of a sale and a buyer's balance.
//! Prices are validated at construction time, so an invalid price cannot
//! reach a sale record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed unit price
const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Maximum decimal places (8)
const MAX_SCALE: u32 = 8;

/// Price represents the validated unit price of a sale.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 8 decimal places
/// - Maximum value is one billion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use flash_sale::domain::Price;
///
/// let price = Price::new(Decimal::new(250, 0)).unwrap();
/// assert_eq!(price.value(), Decimal::new(250, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

/// Errors that can occur when creating a Price or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("Price must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Balance cannot be negative (got {0})")]
    Negative(Decimal),

    #[error("Price has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Price exceeds maximum allowed value ({MAX_PRICE})")]
    Overflow,

    #[error("Invalid price format: {0}")]
    ParseError(String),
}

impl Price {
    /// Create a new Price with validation.
    ///
    /// # Errors
    /// - `PriceError::NotPositive` if value <= 0
    /// - `PriceError::TooManyDecimals` if more than 8 decimal places
    /// - `PriceError::Overflow` if value exceeds the maximum
    pub fn new(value: Decimal) -> Result<Self, PriceError> {
        if value <= Decimal::ZERO {
            return Err(PriceError::NotPositive(value));
        }

        if value.scale() > MAX_SCALE {
            return Err(PriceError::TooManyDecimals(value.scale()));
        }

        if value > MAX_PRICE {
            return Err(PriceError::Overflow);
        }

        Ok(Self(value))
    }

    /// Create a Price from an integer (no decimal places).
    pub fn from_integer(value: i64) -> Result<Self, PriceError> {
        Self::new(Decimal::from(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| PriceError::ParseError(e.to_string()))?;
        Price::new(decimal)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Price::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

/// Balance represents a buyer's currency balance (zero or positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance(Decimal);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: Decimal) -> Result<Self, PriceError> {
        if value < Decimal::ZERO {
            return Err(PriceError::Negative(value));
        }
        Ok(Self(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check if balance covers the price
    pub fn is_sufficient_for(&self, price: &Price) -> bool {
        self.0 >= price.value()
    }

    /// Subtract price from balance
    pub fn debit(&self, price: &Price) -> Result<Balance, PriceError> {
        Balance::new(self.0 - price.value())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}
