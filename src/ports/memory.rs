//! In-memory port adapters
//!
//! Process-local implementations of every port. The service binary and the
//! load test run on these; tests use the failure switches to drive the error
//! paths of the purchase transaction.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    CurrencyPort, InventoryPort, PortError, PurchaseRecord, SaleNotifier, SaleRepository,
};
use crate::domain::{ItemSnapshot, Sale, SaleEvent, SaleStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =========================================================================
// Sale repository
// =========================================================================

#[derive(Debug, Default)]
struct RepositoryState {
    next_id: i64,
    live: BTreeMap<i64, Sale>,
    archive: Vec<Sale>,
    purchases: Vec<PurchaseRecord>,
}

/// Sale table, history table and purchase log held in memory
#[derive(Debug, Default)]
pub struct InMemorySaleRepository {
    state: Mutex<RepositoryState>,
    fail_saves: AtomicBool,
    fail_quantity_updates: AtomicBool,
}

impl InMemorySaleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sale as if it had been persisted by an earlier process.
    /// Keeps the given id when non-zero.
    pub fn seed(&self, mut sale: Sale) -> Sale {
        let mut state = lock(&self.state);
        if sale.id == 0 {
            state.next_id += 1;
            sale.id = state.next_id;
        } else {
            state.next_id = state.next_id.max(sale.id);
        }
        state.live.insert(sale.id, sale.clone());
        sale
    }

    /// Live table contents
    pub fn stored_sales(&self) -> Vec<Sale> {
        lock(&self.state).live.values().cloned().collect()
    }

    pub fn stored_sale(&self, id: i64) -> Option<Sale> {
        lock(&self.state).live.get(&id).cloned()
    }

    /// History table contents, in archive order
    pub fn archived(&self) -> Vec<Sale> {
        lock(&self.state).archive.clone()
    }

    pub fn purchases(&self) -> Vec<PurchaseRecord> {
        lock(&self.state).purchases.clone()
    }

    /// Make `save_sale` fail until switched off
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make `update_sale_quantity` fail until switched off
    pub fn set_fail_quantity_updates(&self, fail: bool) {
        self.fail_quantity_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SaleRepository for InMemorySaleRepository {
    async fn load_active_sales(&self) -> Result<Vec<Sale>, PortError> {
        Ok(lock(&self.state)
            .live
            .values()
            .filter(|sale| !sale.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn save_sale(&self, mut sale: Sale) -> Result<Sale, PortError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("sale table is read-only".to_string()));
        }

        let mut state = lock(&self.state);
        if sale.id == 0 {
            state.next_id += 1;
            sale.id = state.next_id;
        }
        state.live.insert(sale.id, sale.clone());
        Ok(sale)
    }

    async fn update_sale_status(&self, id: i64, status: SaleStatus) -> Result<(), PortError> {
        let mut state = lock(&self.state);
        let sale = state
            .live
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("sale {}", id)))?;
        sale.status = status;
        Ok(())
    }

    async fn update_sale_quantity(
        &self,
        id: i64,
        remaining: u32,
        total_sold: u32,
    ) -> Result<(), PortError> {
        if self.fail_quantity_updates.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("sale table is read-only".to_string()));
        }

        let mut state = lock(&self.state);
        let sale = state
            .live
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("sale {}", id)))?;
        sale.remaining_quantity = remaining;
        sale.total_sold = total_sold;
        Ok(())
    }

    async fn archive_sale(&self, sale: Sale) -> Result<(), PortError> {
        let mut state = lock(&self.state);
        state.live.remove(&sale.id);
        state.archive.push(sale);
        Ok(())
    }

    async fn record_purchase(&self, record: PurchaseRecord) -> Result<(), PortError> {
        lock(&self.state).purchases.push(record);
        Ok(())
    }
}

// =========================================================================
// Currency
// =========================================================================

/// Balances keyed by player id; unknown players have zero
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    balances: Mutex<HashMap<Uuid, Decimal>>,
    latency: Option<Duration>,
    unavailable: AtomicBool,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to exercise port timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn deposit(&self, player: Uuid, amount: Decimal) {
        *lock(&self.balances).entry(player).or_insert(Decimal::ZERO) += amount;
    }

    pub fn balance_of(&self, player: Uuid) -> Decimal {
        lock(&self.balances)
            .get(&player)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn simulate_call(&self) -> Result<(), PortError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("economy provider offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CurrencyPort for InMemoryWallet {
    async fn get_balance(&self, buyer: Uuid) -> Result<Decimal, PortError> {
        self.simulate_call().await?;
        Ok(self.balance_of(buyer))
    }

    async fn set_balance(&self, buyer: Uuid, balance: Decimal) -> Result<(), PortError> {
        self.simulate_call().await?;
        if balance < Decimal::ZERO {
            return Err(PortError::Rejected(format!("negative balance {}", balance)));
        }
        lock(&self.balances).insert(buyer, balance);
        Ok(())
    }
}

// =========================================================================
// Inventory
// =========================================================================

/// Per-player inventories with a fixed slot count
#[derive(Debug)]
pub struct InMemoryInventory {
    slots: usize,
    contents: Mutex<HashMap<Uuid, Vec<ItemSnapshot>>>,
    fail_deliveries: AtomicBool,
}

impl InMemoryInventory {
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            contents: Mutex::new(HashMap::new()),
            fail_deliveries: AtomicBool::new(false),
        }
    }

    /// Pre-fill a player's inventory
    pub fn fill(&self, player: Uuid, items: Vec<ItemSnapshot>) {
        lock(&self.contents).entry(player).or_default().extend(items);
    }

    pub fn items_of(&self, player: Uuid) -> Vec<ItemSnapshot> {
        lock(&self.contents).get(&player).cloned().unwrap_or_default()
    }

    /// Total units delivered to everyone
    pub fn delivered_count(&self) -> usize {
        lock(&self.contents).values().map(Vec::len).sum()
    }

    pub fn set_fail_deliveries(&self, fail: bool) {
        self.fail_deliveries.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryInventory {
    fn default() -> Self {
        Self::new(36)
    }
}

#[async_trait]
impl InventoryPort for InMemoryInventory {
    async fn has_space(&self, buyer: Uuid) -> Result<bool, PortError> {
        let used = lock(&self.contents).get(&buyer).map_or(0, Vec::len);
        Ok(used < self.slots)
    }

    async fn deliver(&self, buyer: Uuid, item: &ItemSnapshot) -> Result<(), PortError> {
        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("player went offline".to_string()));
        }

        let mut contents = lock(&self.contents);
        let items = contents.entry(buyer).or_default();
        if items.len() >= self.slots {
            return Err(PortError::Rejected("inventory full".to_string()));
        }
        items.push(item.clone());
        Ok(())
    }
}

// =========================================================================
// Notifiers
// =========================================================================

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<SaleEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SaleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SaleNotifier for ChannelNotifier {
    fn notify(&self, event: &SaleEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event.clone());
    }
}

/// Writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl SaleNotifier for TracingNotifier {
    fn notify(&self, event: &SaleEvent) {
        let sale = event.sale();
        match event {
            SaleEvent::SaleEnded { reason, .. } => tracing::info!(
                sale_id = sale.id,
                status = %sale.status,
                total_sold = sale.total_sold,
                reason = %reason,
                "Sale ended"
            ),
            SaleEvent::SaleRemoved { removed_by, .. } => tracing::info!(
                sale_id = sale.id,
                removed_by = %removed_by,
                "Sale removed"
            ),
            SaleEvent::PurchaseMade {
                buyer,
                unit_price,
                remaining,
                ..
            } => tracing::info!(
                sale_id = sale.id,
                buyer = %buyer,
                unit_price = %unit_price,
                remaining = remaining,
                "Purchase made"
            ),
            SaleEvent::SaleCreated { .. } | SaleEvent::SaleStarted { .. } => tracing::info!(
                sale_id = sale.id,
                event = event.event_type(),
                status = %sale.status,
                start_time = %sale.start_time,
                end_time = %sale.end_time,
                "Sale lifecycle event"
            ),
        }
    }
}

/// Sends each event to several notifiers in order
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn SaleNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: Arc<dyn SaleNotifier>) -> Self {
        self.targets.push(target);
        self
    }
}

impl SaleNotifier for FanoutNotifier {
    fn notify(&self, event: &SaleEvent) {
        for target in &self.targets {
            target.notify(event);
        }
    }
}
