//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use flash_sale::domain::{ItemSnapshot, Price, Sale, SaleEvent};
use flash_sale::jobs::{SaleScheduler, SchedulerConfig};
use flash_sale::manager::{Actor, CreateSaleCommand, ManagerConfig, SaleManager, SalePorts};
use flash_sale::ports::{ChannelNotifier, InMemoryInventory, InMemorySaleRepository, InMemoryWallet};

/// A manager wired to in-memory ports, with handles to inspect each port
pub struct TestHarness {
    pub manager: Arc<SaleManager>,
    pub repository: Arc<InMemorySaleRepository>,
    pub wallet: Arc<InMemoryWallet>,
    pub inventory: Arc<InMemoryInventory>,
    pub events: UnboundedReceiver<SaleEvent>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    pub fn scheduler(&self) -> SaleScheduler {
        SaleScheduler::with_config(
            self.manager.clone(),
            SchedulerConfig {
                sweep_interval: Duration::from_millis(100),
            },
        )
    }

    /// A buyer holding `funds`
    pub fn funded_buyer(&self, funds: i64) -> Uuid {
        let buyer = Uuid::new_v4();
        self.wallet.deposit(buyer, Decimal::from(funds));
        buyer
    }

    /// Everything emitted so far
    pub fn drain_events(&mut self) -> Vec<SaleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn drain_event_types(&mut self) -> Vec<&'static str> {
        self.drain_events().iter().map(|e| e.event_type()).collect()
    }
}

#[derive(Default)]
pub struct TestHarnessBuilder {
    repository: Option<Arc<InMemorySaleRepository>>,
    wallet: Option<InMemoryWallet>,
    inventory_slots: Option<usize>,
    max_active_sales: Option<usize>,
    port_timeout: Option<Duration>,
}

impl TestHarnessBuilder {
    /// Reuse a repository, as a restarted process would
    pub fn repository(mut self, repository: Arc<InMemorySaleRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn wallet(mut self, wallet: InMemoryWallet) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn inventory_slots(mut self, slots: usize) -> Self {
        self.inventory_slots = Some(slots);
        self
    }

    pub fn max_active_sales(mut self, max: usize) -> Self {
        self.max_active_sales = Some(max);
        self
    }

    pub fn port_timeout(mut self, timeout: Duration) -> Self {
        self.port_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TestHarness {
        let defaults = ManagerConfig::default();
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemorySaleRepository::new()));
        let wallet = Arc::new(self.wallet.unwrap_or_default());
        let inventory = Arc::new(match self.inventory_slots {
            Some(slots) => InMemoryInventory::new(slots),
            None => InMemoryInventory::default(),
        });
        let (notifier, events) = ChannelNotifier::new();

        let manager = SaleManager::new(
            ManagerConfig {
                max_active_sales: self.max_active_sales.unwrap_or(defaults.max_active_sales),
                port_timeout: self.port_timeout.unwrap_or(defaults.port_timeout),
            },
            SalePorts {
                repository: repository.clone(),
                currency: wallet.clone(),
                inventory: inventory.clone(),
                notifier: Arc::new(notifier),
            },
        );

        TestHarness {
            manager,
            repository,
            wallet,
            inventory,
            events,
        }
    }
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), "Admin")
}

pub fn diamond() -> ItemSnapshot {
    ItemSnapshot::new(serde_json::json!({ "material": "DIAMOND", "amount": 1 }))
}

/// Sale of `quantity` diamonds at 100 each
pub fn sale_command(quantity: u32, start_delay: Duration, duration: Duration) -> CreateSaleCommand {
    CreateSaleCommand::new(
        admin(),
        diamond(),
        Price::from_integer(100).unwrap(),
        quantity,
        start_delay,
        duration,
    )
}

/// A sale as an earlier process would have persisted it
pub fn persisted_sale(
    id: i64,
    quantity: u32,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Sale {
    let mut sale = Sale::new(
        diamond(),
        Price::from_integer(100).unwrap(),
        quantity,
        start_time,
        end_time,
        Uuid::new_v4(),
        "Admin".to_string(),
    );
    sale.id = id;
    sale
}
