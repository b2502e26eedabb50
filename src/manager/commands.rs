//! Command definitions
//!
//! Inputs and results of the admin-facing and buyer-facing operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{parse_duration, CreateError, ItemSnapshot, Price};
use crate::ports::PurchaseRecord;

/// Who is performing an operation (operator or buyer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
}

impl Actor {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

// =========================================================================
// CreateSaleCommand
// =========================================================================

/// Command to schedule a new flash sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSaleCommand {
    pub creator: Actor,
    pub item: ItemSnapshot,
    pub price: Price,
    pub quantity: u32,
    /// Delay from now until the sale opens
    pub start_delay: Duration,
    /// How long the sale stays open once started
    pub duration: Duration,
}

impl CreateSaleCommand {
    pub fn new(
        creator: Actor,
        item: ItemSnapshot,
        price: Price,
        quantity: u32,
        start_delay: Duration,
        duration: Duration,
    ) -> Self {
        Self {
            creator,
            item,
            price,
            quantity,
            start_delay,
            duration,
        }
    }

    /// Build a command from operator-entered text such as `"250"`, `"5m"`, `"1h"`.
    pub fn parse(
        creator: Actor,
        item: ItemSnapshot,
        price: &str,
        start_delay: &str,
        quantity: u32,
        duration: &str,
    ) -> Result<Self, CreateError> {
        let price: Price = price
            .parse()
            .map_err(|e| CreateError::InvalidPrice(format!("{}", e)))?;
        let start_delay =
            parse_duration(start_delay).map_err(|e| CreateError::InvalidDuration(e.to_string()))?;
        let duration =
            parse_duration(duration).map_err(|e| CreateError::InvalidDuration(e.to_string()))?;

        Ok(Self::new(creator, item, price, quantity, start_delay, duration))
    }
}

/// Result of a successful purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub purchase_id: Uuid,
    pub sale_id: i64,
    pub buyer: Uuid,
    pub unit_price: Decimal,
    /// Stock left right after this purchase
    pub remaining: u32,
    pub purchased_at: DateTime<Utc>,
}

impl From<&Receipt> for PurchaseRecord {
    fn from(receipt: &Receipt) -> Self {
        Self {
            purchase_id: receipt.purchase_id,
            sale_id: receipt.sale_id,
            buyer: receipt.buyer,
            unit_price: receipt.unit_price,
            purchased_at: receipt.purchased_at,
        }
    }
}
