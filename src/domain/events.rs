//! Sale notifications
//!
//! Events emitted to the notification port. Each carries the full sale snapshot
//! as it was when the event happened; formatting and delivery are up to the
//! consumer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Sale;

/// Sale lifecycle and purchase events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SaleEvent {
    /// Sale was created and registered
    SaleCreated { sale: Sale },

    /// Sale became purchasable
    SaleStarted { sale: Sale },

    /// Sale reached a terminal status
    SaleEnded { sale: Sale, reason: String },

    /// Sale was cancelled by an operator
    SaleRemoved { sale: Sale, removed_by: String },

    /// One unit was bought
    PurchaseMade {
        sale: Sale,
        buyer: Uuid,
        unit_price: Decimal,
        remaining: u32,
    },
}

impl SaleEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleCreated { .. } => "SaleCreated",
            SaleEvent::SaleStarted { .. } => "SaleStarted",
            SaleEvent::SaleEnded { .. } => "SaleEnded",
            SaleEvent::SaleRemoved { .. } => "SaleRemoved",
            SaleEvent::PurchaseMade { .. } => "PurchaseMade",
        }
    }

    /// Snapshot of the sale this event relates to
    pub fn sale(&self) -> &Sale {
        match self {
            SaleEvent::SaleCreated { sale }
            | SaleEvent::SaleStarted { sale }
            | SaleEvent::SaleEnded { sale, .. }
            | SaleEvent::SaleRemoved { sale, .. }
            | SaleEvent::PurchaseMade { sale, .. } => sale,
        }
    }

    pub fn sale_id(&self) -> i64 {
        self.sale().id
    }
}
