//! Ports
//!
//! Narrow interfaces to the collaborators the sale core depends on but does
//! not implement: persistence, currency, inventory and notifications. All of
//! them are injected as trait objects; `memory` holds in-process adapters.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ItemSnapshot, Sale, SaleEvent, SaleStatus};

pub use memory::{
    ChannelNotifier, FanoutNotifier, InMemoryInventory, InMemorySaleRepository, InMemoryWallet,
    TracingNotifier,
};

/// Failure reported by a port
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Port call timed out after {0} ms")]
    Timeout(u64),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Rejected by backend: {0}")]
    Rejected(String),
}

/// Audit row for one completed purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub purchase_id: Uuid,
    pub sale_id: i64,
    pub buyer: Uuid,
    pub unit_price: Decimal,
    pub purchased_at: DateTime<Utc>,
}

/// Durable storage for sales
#[async_trait]
pub trait SaleRepository: Send + Sync {
    /// Load every sale that is still pending or active
    async fn load_active_sales(&self) -> Result<Vec<Sale>, PortError>;

    /// Insert or replace a sale; assigns an id when `sale.id == 0`
    async fn save_sale(&self, sale: Sale) -> Result<Sale, PortError>;

    async fn update_sale_status(&self, id: i64, status: SaleStatus) -> Result<(), PortError>;

    async fn update_sale_quantity(
        &self,
        id: i64,
        remaining: u32,
        total_sold: u32,
    ) -> Result<(), PortError>;

    /// Move a terminal sale out of the live table into history
    async fn archive_sale(&self, sale: Sale) -> Result<(), PortError>;

    async fn record_purchase(&self, record: PurchaseRecord) -> Result<(), PortError>;
}

/// Buyer balances. Treated as synchronous and authoritative.
#[async_trait]
pub trait CurrencyPort: Send + Sync {
    async fn get_balance(&self, buyer: Uuid) -> Result<Decimal, PortError>;

    async fn set_balance(&self, buyer: Uuid, balance: Decimal) -> Result<(), PortError>;
}

/// Buyer inventories
#[async_trait]
pub trait InventoryPort: Send + Sync {
    async fn has_space(&self, buyer: Uuid) -> Result<bool, PortError>;

    async fn deliver(&self, buyer: Uuid, item: &ItemSnapshot) -> Result<(), PortError>;
}

/// Sink for sale events. Must not block.
pub trait SaleNotifier: Send + Sync {
    fn notify(&self, event: &SaleEvent);
}
