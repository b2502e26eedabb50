//! Sale Operation Errors
//!
//! Typed rejections for the admin-facing and buyer-facing operations. Callers
//! translate these into messages; the core only guarantees each kind is
//! distinguishable.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::SaleStatus;
use crate::ports::PortError;

/// Errors from `create_sale`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CreateError {
    /// Too many sales are already pending or active
    #[error("Maximum of {max} concurrent sales reached")]
    CapacityReached { max: usize },

    /// Item snapshot carries nothing to sell
    #[error("Item snapshot is empty")]
    InvalidItem,

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Quantity must be positive")]
    InvalidQuantity,

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Repository refused the new sale; nothing was registered
    #[error("Failed to persist sale: {0}")]
    Persistence(PortError),
}

impl CreateError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CapacityReached { .. } => "capacity_reached",
            Self::InvalidItem => "invalid_item",
            Self::InvalidPrice(_) => "invalid_price",
            Self::InvalidQuantity => "invalid_quantity",
            Self::InvalidDuration(_) => "invalid_duration",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// Check if this is a validation error (caller's input)
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidItem
                | Self::InvalidPrice(_)
                | Self::InvalidQuantity
                | Self::InvalidDuration(_)
        )
    }
}

/// Errors from `remove_sale`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoveError {
    /// The id is unknown or the sale already ended
    #[error("No live sale with id {0}")]
    NotFound(i64),
}

impl RemoveError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "sale_not_found",
        }
    }
}

/// Errors from `attempt_purchase`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PurchaseError {
    #[error("No live sale with id {0}")]
    NotFound(i64),

    #[error("Sale is not active (status {status})")]
    NotActive { status: SaleStatus },

    #[error("Sale is sold out")]
    SoldOut,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Inventory is full")]
    InventoryFull,

    /// A port failed before any money moved
    #[error("Purchase aborted: {0}")]
    Port(PortError),

    /// Money was taken but the item did not arrive; needs an operator
    #[error("Sale {sale_id}: buyer {buyer} was charged {amount} but delivery failed: {reason}")]
    DeliveryFailedAfterDebit {
        sale_id: i64,
        buyer: Uuid,
        amount: Decimal,
        reason: String,
    },
}

impl PurchaseError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "sale_not_found",
            Self::NotActive { .. } => "sale_not_active",
            Self::SoldOut => "sold_out",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InventoryFull => "inventory_full",
            Self::Port(_) => "port_failure",
            Self::DeliveryFailedAfterDebit { .. } => "delivery_failed_after_debit",
        }
    }

    /// Whether a human has to reconcile this purchase by hand
    pub fn requires_operator(&self) -> bool {
        matches!(self, Self::DeliveryFailedAfterDebit { .. })
    }

    /// Check if this is the buyer's problem rather than the system's
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::NotActive { .. }
                | Self::SoldOut
                | Self::InsufficientFunds { .. }
                | Self::InventoryFull
        )
    }
}
