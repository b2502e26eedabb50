//! Sale record
//!
//! The flash sale entity and its lifecycle status. Everything except the stock
//! counters and the status is fixed when the sale is created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::Price;

/// Sale lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Pending,
    Active,
    Expired,
    Completed,
    Cancelled,
}

impl SaleStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Completed | Self::Cancelled)
    }

    /// Whether `next` is a legal edge from this status
    pub fn can_transition_to(&self, next: SaleStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Cancelled)
                | (Self::Active, Self::Expired)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown sale status: {}", other)),
        }
    }
}

/// Opaque, deep-copied representation of the good being sold.
///
/// The core never interprets the payload; it only checks that it is not empty
/// and hands it to the inventory port on delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemSnapshot(serde_json::Value);

impl ItemSnapshot {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// `null`, `""`, `[]` and `{}` carry no item
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::Object(fields) => fields.is_empty(),
            _ => false,
        }
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Why a sale refused a state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaleStateError {
    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition { from: SaleStatus, to: SaleStatus },

    #[error("Sale is not active (status {0})")]
    NotActive(SaleStatus),

    #[error("Sale has no remaining stock")]
    OutOfStock,
}

/// One scheduled, time-bounded, quantity-limited offer of a single item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    /// Assigned by the repository on first save; 0 before that
    pub id: i64,
    pub item: ItemSnapshot,
    pub price: Price,
    pub initial_quantity: u32,
    pub remaining_quantity: u32,
    pub total_sold: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub creator_id: Uuid,
    pub creator_name: String,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Build an unsaved, pending sale.
    pub fn new(
        item: ItemSnapshot,
        price: Price,
        quantity: u32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        creator_id: Uuid,
        creator_name: String,
    ) -> Self {
        Self {
            id: 0,
            item,
            price,
            initial_quantity: quantity,
            remaining_quantity: quantity,
            total_sold: 0,
            start_time,
            end_time,
            creator_id,
            creator_name,
            status: SaleStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_purchasable(&self, now: DateTime<Utc>) -> bool {
        self.status == SaleStatus::Active && self.remaining_quantity > 0 && now < self.end_time
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }

    /// Time left before the sale opens (zero once started)
    pub fn time_until_start(&self, now: DateTime<Utc>) -> Duration {
        (self.start_time - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time left before the sale closes (zero once ended)
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Move along one edge of the lifecycle.
    pub fn transition_to(&mut self, next: SaleStatus) -> Result<(), SaleStateError> {
        if !self.status.can_transition_to(next) {
            return Err(SaleStateError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Take one unit off the stock counter.
    pub fn record_sale(&mut self) -> Result<(), SaleStateError> {
        if self.status != SaleStatus::Active {
            return Err(SaleStateError::NotActive(self.status));
        }
        if self.remaining_quantity == 0 {
            return Err(SaleStateError::OutOfStock);
        }
        self.remaining_quantity -= 1;
        self.total_sold += 1;
        Ok(())
    }

    pub fn is_sold_out(&self) -> bool {
        self.remaining_quantity == 0
    }

    /// `total_sold + remaining == initial` and `remaining <= initial`
    pub fn counters_consistent(&self) -> bool {
        self.remaining_quantity <= self.initial_quantity
            && self.total_sold + self.remaining_quantity == self.initial_quantity
    }
}
