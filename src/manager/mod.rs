//! Sale Manager
//!
//! Owns the authoritative set of live (pending or active) sales, enforces the
//! concurrency cap and drives every lifecycle transition.
//!
//! Two exclusion scopes guard the state:
//! - the registry lock, a short-lived `std::sync::Mutex` around the live map,
//!   never held across an `.await`;
//! - one `tokio::sync::Mutex` per live sale, around the sale record and its
//!   pending deadline timer.
//!
//! A per-sale lock may be held while taking the registry lock, never the
//! other way round. Purchases additionally take a per-buyer lock, always
//! after the sale lock.

mod buyers;
mod commands;
mod purchase;


pub use commands::{Actor, CreateSaleCommand, Receipt};

use buyers::BuyerLocks;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::{format_std_duration, CreateError, RemoveError, Sale, SaleEvent, SaleStatus};
use crate::jobs::deadline::{self, DeadlineKind, DeadlineTimer};
use crate::ports::{CurrencyPort, InventoryPort, PortError, SaleNotifier, SaleRepository};

/// Reason attached to sales ending at their end time
pub const REASON_TIME_EXPIRED: &str = "Time expired";

/// Reason attached to sales whose stock ran out
pub const REASON_SOLD_OUT: &str = "Sold out";

/// Configuration for the sale manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of sales pending or active at once (default: 4)
    pub max_active_sales: usize,
    /// Upper bound for any single port call (default: 5 seconds)
    pub port_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_active_sales: 4,
            port_timeout: Duration::from_secs(5),
        }
    }
}

/// External collaborators, injected at construction
#[derive(Clone)]
pub struct SalePorts {
    pub repository: Arc<dyn SaleRepository>,
    pub currency: Arc<dyn CurrencyPort>,
    pub inventory: Arc<dyn InventoryPort>,
    pub notifier: Arc<dyn SaleNotifier>,
}

/// What a deadline check did to a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineAction {
    /// Nothing was due
    None,
    /// Pending sale reached its start time
    Started,
    /// Active sale reached its end time
    Expired,
    /// Start and end had both passed; started then expired
    StartedAndExpired,
}

/// Outcome of restoring one persisted sale at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Registered with a deadline timer armed
    Scheduled(SaleStatus),
    /// Registered and transitioned by overdue deadlines
    Reconciled(DeadlineAction),
    /// Not registered (terminal or already live)
    Skipped,
}

/// One live sale and its pending deadline
#[derive(Debug)]
pub(crate) struct SaleSlot {
    pub(crate) sale: Sale,
    pub(crate) timer: Option<DeadlineTimer>,
}

type SaleCell = Arc<AsyncMutex<SaleSlot>>;

#[derive(Default)]
struct Registry {
    live: BTreeMap<i64, SaleCell>,
    /// Creations that passed the capacity check but are not inserted yet
    reserved: usize,
    /// Final status of recently ended sales, oldest id first
    ended: BTreeMap<i64, SaleStatus>,
}

/// How many ended sales the registry remembers
const ENDED_HISTORY: usize = 256;

/// Flash sale registry and state machine
pub struct SaleManager {
    config: ManagerConfig,
    ports: SalePorts,
    registry: Mutex<Registry>,
    buyer_locks: BuyerLocks,
    timer_generation: AtomicU64,
    self_ref: Weak<SaleManager>,
}

impl SaleManager {
    /// Create a manager. Timers need a handle back to the manager, so it is
    /// always shared.
    pub fn new(config: ManagerConfig, ports: SalePorts) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            ports,
            registry: Mutex::new(Registry::default()),
            buyer_locks: BuyerLocks::default(),
            timer_generation: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub(crate) fn repository(&self) -> &dyn SaleRepository {
        self.ports.repository.as_ref()
    }

    // =========================================================================
    // createSale
    // =========================================================================

    /// Validate, persist, register and schedule a new sale.
    pub async fn create_sale(&self, command: CreateSaleCommand) -> Result<Sale, CreateError> {
        if command.item.is_empty() {
            return Err(CreateError::InvalidItem);
        }
        if command.quantity == 0 {
            return Err(CreateError::InvalidQuantity);
        }
        if command.duration.is_zero() {
            return Err(CreateError::InvalidDuration(
                "duration must be greater than zero".to_string(),
            ));
        }

        let now = Utc::now();
        let start_time = offset(now, command.start_delay)?;
        let end_time = offset(start_time, command.duration)?;

        self.reserve_slot()?;

        let sale = Sale::new(
            command.item,
            command.price,
            command.quantity,
            start_time,
            end_time,
            command.creator.id,
            command.creator.name,
        );

        let saved = match self.call(self.ports.repository.save_sale(sale)).await {
            Ok(saved) => saved,
            Err(e) => {
                self.release_reservation();
                tracing::error!(error = %e, "Failed to persist new sale");
                return Err(CreateError::Persistence(e));
            }
        };

        let cell: SaleCell = Arc::new(AsyncMutex::new(SaleSlot {
            sale: saved.clone(),
            timer: None,
        }));
        let mut slot = cell.lock().await;
        self.insert_reserved(saved.id, cell.clone());

        tracing::info!(
            sale_id = saved.id,
            creator = %saved.creator_name,
            price = %saved.price,
            quantity = saved.initial_quantity,
            start_time = %saved.start_time,
            end_time = %saved.end_time,
            opens_in = %format_std_duration(saved.time_until_start(now)),
            "Sale created"
        );
        self.ports.notifier.notify(&SaleEvent::SaleCreated { sale: saved });

        if slot.sale.has_started(Utc::now()) {
            self.start_locked(&mut slot).await;
        } else {
            self.arm_deadline(&mut slot);
        }

        Ok(slot.sale.clone())
    }

    // =========================================================================
    // removeSale
    // =========================================================================

    /// Cancel a live sale on an operator's request.
    pub async fn remove_sale(&self, admin: &Actor, sale_id: i64) -> Result<Sale, RemoveError> {
        let cell = self.lookup(sale_id).ok_or(RemoveError::NotFound(sale_id))?;
        let mut slot = cell.lock().await;

        let reason = format!("Manually removed by {}", admin.name);
        if !self.end_locked(&mut slot, SaleStatus::Cancelled, &reason).await {
            // Ended between the lookup and taking the lock
            return Err(RemoveError::NotFound(sale_id));
        }

        self.ports.notifier.notify(&SaleEvent::SaleRemoved {
            sale: slot.sale.clone(),
            removed_by: admin.name.clone(),
        });

        Ok(slot.sale.clone())
    }

    // =========================================================================
    // startSale / endSale
    // =========================================================================

    /// Move a pending sale to active. Returns false if the sale is not live
    /// or not pending.
    pub async fn start_sale(&self, sale_id: i64) -> bool {
        let Some(cell) = self.lookup(sale_id) else {
            return false;
        };
        let mut slot = cell.lock().await;
        self.start_locked(&mut slot).await
    }

    /// Move a live sale to a terminal status. Returns false (and does
    /// nothing) if the sale already left the live set or the edge is illegal.
    pub async fn end_sale(&self, sale_id: i64, status: SaleStatus, reason: &str) -> bool {
        let Some(cell) = self.lookup(sale_id) else {
            tracing::debug!(sale_id = sale_id, "End requested for sale that is no longer live");
            return false;
        };
        let mut slot = cell.lock().await;
        self.end_locked(&mut slot, status, reason).await
    }

    pub(crate) async fn start_locked(&self, slot: &mut SaleSlot) -> bool {
        if let Err(e) = slot.sale.transition_to(SaleStatus::Active) {
            tracing::debug!(sale_id = slot.sale.id, error = %e, "Start skipped");
            return false;
        }

        let sale_id = slot.sale.id;
        if let Err(e) = self
            .call(self.ports.repository.update_sale_status(sale_id, SaleStatus::Active))
            .await
        {
            tracing::error!(sale_id = sale_id, error = %e, "Failed to persist sale start");
        }

        self.arm_deadline(slot);

        tracing::info!(
            sale_id = sale_id,
            end_time = %slot.sale.end_time,
            time_remaining = %format_std_duration(slot.sale.time_remaining(Utc::now())),
            remaining = slot.sale.remaining_quantity,
            "Sale started"
        );
        self.ports.notifier.notify(&SaleEvent::SaleStarted {
            sale: slot.sale.clone(),
        });

        true
    }

    pub(crate) async fn end_locked(
        &self,
        slot: &mut SaleSlot,
        status: SaleStatus,
        reason: &str,
    ) -> bool {
        let sale_id = slot.sale.id;
        if !status.is_terminal() || !slot.sale.status.can_transition_to(status) {
            tracing::debug!(
                sale_id = sale_id,
                from = %slot.sale.status,
                to = %status,
                "End skipped"
            );
            return false;
        }

        self.unregister(sale_id, status);
        if let Some(timer) = slot.timer.take() {
            timer.cancel();
        }

        let now = Utc::now();
        slot.sale.status = status;
        if status == SaleStatus::Expired && now > slot.sale.start_time {
            slot.sale.end_time = now;
        }

        if let Err(e) = self
            .call(self.ports.repository.archive_sale(slot.sale.clone()))
            .await
        {
            tracing::error!(sale_id = sale_id, error = %e, "Failed to archive ended sale");
        }

        tracing::info!(
            sale_id = sale_id,
            status = %status,
            total_sold = slot.sale.total_sold,
            remaining = slot.sale.remaining_quantity,
            reason = %reason,
            "Sale ended"
        );
        self.ports.notifier.notify(&SaleEvent::SaleEnded {
            sale: slot.sale.clone(),
            reason: reason.to_string(),
        });

        true
    }

    // =========================================================================
    // Deadlines
    // =========================================================================

    /// Replace the sale's timer with the one its status calls for.
    pub(crate) fn arm_deadline(&self, slot: &mut SaleSlot) {
        if let Some(previous) = slot.timer.take() {
            previous.cancel();
        }

        let (kind, fires_at) = match slot.sale.status {
            SaleStatus::Pending => (DeadlineKind::Start, slot.sale.start_time),
            SaleStatus::Active => (DeadlineKind::End, slot.sale.end_time),
            _ => return,
        };

        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        slot.timer = Some(deadline::schedule(
            self.self_ref.clone(),
            slot.sale.id,
            kind,
            fires_at,
            generation,
        ));
    }

    /// Timer callback
    pub(crate) async fn on_deadline(&self, sale_id: i64, kind: DeadlineKind, generation: u64) {
        let Some(cell) = self.lookup(sale_id) else {
            tracing::debug!(sale_id = sale_id, "Deadline fired for sale that is no longer live");
            return;
        };
        let mut slot = cell.lock().await;

        match &slot.timer {
            Some(timer) if timer.generation() == generation => {
                // This task is the timer; dropping the handle does not abort it
                slot.timer = None;
            }
            _ => {
                tracing::debug!(sale_id = sale_id, kind = ?kind, "Stale deadline ignored");
                return;
            }
        }

        match kind {
            DeadlineKind::Start => {
                self.start_locked(&mut slot).await;
            }
            DeadlineKind::End => {
                self.end_locked(&mut slot, SaleStatus::Expired, REASON_TIME_EXPIRED)
                    .await;
            }
        }
    }

    /// Apply every deadline that has already passed at `now`, in lifecycle
    /// order. Used by the sweep and by startup reconciliation.
    pub async fn enforce_deadlines(&self, sale_id: i64, now: DateTime<Utc>) -> DeadlineAction {
        let Some(cell) = self.lookup(sale_id) else {
            return DeadlineAction::None;
        };
        let mut slot = cell.lock().await;
        self.enforce_locked(&mut slot, now).await
    }

    async fn enforce_locked(&self, slot: &mut SaleSlot, now: DateTime<Utc>) -> DeadlineAction {
        let mut started = false;
        if slot.sale.status == SaleStatus::Pending && slot.sale.has_started(now) {
            started = self.start_locked(slot).await;
        }

        let expired = slot.sale.status == SaleStatus::Active
            && slot.sale.has_ended(now)
            && self
                .end_locked(slot, SaleStatus::Expired, REASON_TIME_EXPIRED)
                .await;

        match (started, expired) {
            (true, true) => DeadlineAction::StartedAndExpired,
            (true, false) => DeadlineAction::Started,
            (false, true) => DeadlineAction::Expired,
            (false, false) => DeadlineAction::None,
        }
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Register a sale loaded from the repository and reconcile its
    /// deadlines against the current time.
    pub async fn restore_sale(&self, sale: Sale) -> RestoreOutcome {
        let sale_id = sale.id;
        if sale.status.is_terminal() {
            tracing::warn!(
                sale_id = sale_id,
                status = %sale.status,
                "Repository returned a terminal sale as live; skipping"
            );
            return RestoreOutcome::Skipped;
        }

        let cell: SaleCell = Arc::new(AsyncMutex::new(SaleSlot { sale, timer: None }));
        let mut slot = cell.lock().await;

        {
            let mut registry = self.registry();
            if registry.live.contains_key(&sale_id) {
                tracing::warn!(sale_id = sale_id, "Sale already live; skipping restore");
                return RestoreOutcome::Skipped;
            }
            if registry.live.len() + registry.reserved >= self.config.max_active_sales {
                tracing::warn!(
                    sale_id = sale_id,
                    max = self.config.max_active_sales,
                    "Restoring sale beyond the concurrent sale limit"
                );
            }
            registry.live.insert(sale_id, cell.clone());
        }

        let action = self.enforce_locked(&mut slot, Utc::now()).await;
        if action != DeadlineAction::None {
            return RestoreOutcome::Reconciled(action);
        }

        self.arm_deadline(&mut slot);
        RestoreOutcome::Scheduled(slot.sale.status)
    }

    /// Abort every pending timer. Sale state is left untouched so the next
    /// startup can reconcile it.
    pub async fn shutdown(&self) {
        for cell in self.live_cells() {
            let mut slot = cell.lock().await;
            if let Some(timer) = slot.timer.take() {
                timer.cancel();
            }
        }
        tracing::info!("Sale manager timers stopped");
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshots of all live sales, ordered by id
    pub async fn active_sales(&self) -> Vec<Sale> {
        let mut sales = Vec::new();
        for cell in self.live_cells() {
            let slot = cell.lock().await;
            if slot.sale.is_live() {
                sales.push(slot.sale.clone());
            }
        }
        sales
    }

    pub async fn sale_by_id(&self, sale_id: i64) -> Option<Sale> {
        let cell = self.lookup(sale_id)?;
        let slot = cell.lock().await;
        slot.sale.is_live().then(|| slot.sale.clone())
    }

    /// Ids of all live sales, ordered
    pub fn live_ids(&self) -> Vec<i64> {
        self.registry().live.keys().copied().collect()
    }

    pub fn live_count(&self) -> usize {
        self.registry().live.len()
    }

    pub fn has_capacity(&self) -> bool {
        let registry = self.registry();
        registry.live.len() + registry.reserved < self.config.max_active_sales
    }

    /// Whether a deadline timer is pending for the sale
    pub async fn has_pending_deadline(&self, sale_id: i64) -> bool {
        match self.lookup(sale_id) {
            Some(cell) => cell.lock().await.timer.is_some(),
            None => false,
        }
    }

    // =========================================================================
    // Registry (short critical sections only)
    // =========================================================================

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve_slot(&self) -> Result<(), CreateError> {
        let mut registry = self.registry();
        let max = self.config.max_active_sales;
        if registry.live.len() + registry.reserved >= max {
            tracing::warn!(max = max, "Sale creation rejected: capacity reached");
            return Err(CreateError::CapacityReached { max });
        }
        registry.reserved += 1;
        Ok(())
    }

    fn release_reservation(&self) {
        let mut registry = self.registry();
        registry.reserved = registry.reserved.saturating_sub(1);
    }

    fn insert_reserved(&self, sale_id: i64, cell: SaleCell) {
        let mut registry = self.registry();
        registry.reserved = registry.reserved.saturating_sub(1);
        registry.live.insert(sale_id, cell);
    }

    fn unregister(&self, sale_id: i64, status: SaleStatus) {
        let mut registry = self.registry();
        registry.live.remove(&sale_id);
        registry.ended.insert(sale_id, status);
        while registry.ended.len() > ENDED_HISTORY {
            registry.ended.pop_first();
        }
    }

    /// Terminal status of a sale that left the live set recently
    pub(crate) fn ended_status(&self, sale_id: i64) -> Option<SaleStatus> {
        self.registry().ended.get(&sale_id).copied()
    }

    fn lookup(&self, sale_id: i64) -> Option<SaleCell> {
        self.registry().live.get(&sale_id).cloned()
    }

    fn live_cells(&self) -> Vec<SaleCell> {
        self.registry().live.values().cloned().collect()
    }

    /// Run a port call under the configured timeout
    pub(crate) async fn call<T, F>(&self, future: F) -> Result<T, PortError>
    where
        F: Future<Output = Result<T, PortError>>,
    {
        let limit = self.config.port_timeout;
        match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Timeout(limit.as_millis() as u64)),
        }
    }
}

fn offset(base: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>, CreateError> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| base.checked_add_signed(by))
        .ok_or_else(|| CreateError::InvalidDuration(format!("{:?} is out of range", by)))
}
