//! Per-buyer exclusion
//!
//! A buyer's balance and inventory are shared by every sale they buy from, so
//! the check-then-debit window of a purchase is serialized per buyer as well
//! as per sale. Always taken after the sale lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type BuyerCell = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
pub(crate) struct BuyerLocks {
    cells: Mutex<HashMap<Uuid, BuyerCell>>,
}

impl BuyerLocks {
    fn cells(&self) -> MutexGuard<'_, HashMap<Uuid, BuyerCell>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no other purchase holds `buyer`.
    pub(crate) async fn acquire(&self, buyer: Uuid) -> BuyerGuard<'_> {
        let cell = self.cells().entry(buyer).or_default().clone();
        let guard = cell.clone().lock_owned().await;
        BuyerGuard {
            locks: self,
            buyer,
            cell,
            guard: Some(guard),
        }
    }

    /// Buyers with a purchase in flight or waiting
    pub(crate) fn tracked(&self) -> usize {
        self.cells().len()
    }
}

/// Held for the duration of one purchase; the map entry goes away with the
/// last holder.
pub(crate) struct BuyerGuard<'a> {
    locks: &'a BuyerLocks,
    buyer: Uuid,
    cell: BuyerCell,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for BuyerGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut cells = self.locks.cells();
        // The map and this guard are the only owners left: nobody is waiting
        if Arc::strong_count(&self.cell) == 2 {
            cells.remove(&self.buyer);
        }
    }
}
