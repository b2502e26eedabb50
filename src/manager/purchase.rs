//! Purchase Transaction
//!
//! Buys one unit of a live sale. The whole transaction runs under the sale's
//! own lock, so purchases against one sale are totally ordered while
//! unrelated sales proceed in parallel.
//!
//! The same buyer buying from two sales at once is serialized by a per-buyer
//! lock, taken after the sale lock and held through delivery.
//!
//! Every rejection happens before the buyer is charged. Once the debit has
//! gone through the purchase is committed: the stock counter is decremented
//! and any later failure is surfaced as `DeliveryFailedAfterDebit`.

use chrono::Utc;
use uuid::Uuid;

use super::{Receipt, SaleManager, SaleSlot, REASON_SOLD_OUT, REASON_TIME_EXPIRED};
use crate::domain::{Balance, PurchaseError, SaleEvent, SaleStatus};
use crate::ports::{PortError, PurchaseRecord};

impl SaleManager {
    /// Attempt to buy one unit of `sale_id` for `buyer`.
    pub async fn attempt_purchase(
        &self,
        buyer: Uuid,
        sale_id: i64,
    ) -> Result<Receipt, PurchaseError> {
        let cell = match self.lookup(sale_id) {
            Some(cell) => cell,
            // Losers of a sell-out race arrive after the sale left the live set
            None => {
                return Err(match self.ended_status(sale_id) {
                    Some(SaleStatus::Completed) => PurchaseError::SoldOut,
                    Some(status) => PurchaseError::NotActive { status },
                    None => PurchaseError::NotFound(sale_id),
                })
            }
        };
        let mut slot = cell.lock().await;

        self.check_purchasable(&mut slot).await?;

        let price = slot.sale.price;
        let _buyer_guard = self.buyer_locks.acquire(buyer).await;

        let available = self
            .call(self.ports.currency.get_balance(buyer))
            .await
            .map_err(PurchaseError::Port)?;
        let balance = Balance::new(available).map_err(|e| {
            PurchaseError::Port(PortError::Rejected(format!("invalid balance: {}", e)))
        })?;
        if !balance.is_sufficient_for(&price) {
            return Err(PurchaseError::InsufficientFunds {
                required: price.value(),
                available,
            });
        }

        let has_space = self
            .call(self.ports.inventory.has_space(buyer))
            .await
            .map_err(PurchaseError::Port)?;
        if !has_space {
            return Err(PurchaseError::InventoryFull);
        }

        let new_balance = balance.debit(&price).map_err(|e| {
            PurchaseError::Port(PortError::Rejected(format!("debit refused: {}", e)))
        })?;

        match self
            .call(self.ports.currency.set_balance(buyer, new_balance.value()))
            .await
        {
            Ok(()) => {}
            Err(PortError::Timeout(ms)) => {
                // The backend may or may not have applied the debit
                tracing::error!(
                    sale_id = sale_id,
                    buyer = %buyer,
                    amount = %price,
                    timeout_ms = ms,
                    "Debit timed out; outcome unknown, operator review required"
                );
                return Err(PurchaseError::DeliveryFailedAfterDebit {
                    sale_id,
                    buyer,
                    amount: price.value(),
                    reason: format!("debit outcome unknown after {} ms timeout", ms),
                });
            }
            Err(e) => return Err(PurchaseError::Port(e)),
        }

        // Committed from here on
        let outcome = self.commit_purchase(&mut slot, buyer).await;

        if slot.sale.is_sold_out() {
            self.end_locked(&mut slot, SaleStatus::Completed, REASON_SOLD_OUT)
                .await;
        }

        outcome
    }

    /// Steps 1 and 2: status and stock checks, with their side effects.
    async fn check_purchasable(&self, slot: &mut SaleSlot) -> Result<(), PurchaseError> {
        let now = Utc::now();
        if slot.sale.is_purchasable(now) {
            return Ok(());
        }

        let status = slot.sale.status;
        if status == SaleStatus::Completed {
            return Err(PurchaseError::SoldOut);
        }
        if status != SaleStatus::Active {
            return Err(PurchaseError::NotActive { status });
        }

        if slot.sale.has_ended(now) {
            // The end timer and sweep have not caught up yet
            self.end_locked(slot, SaleStatus::Expired, REASON_TIME_EXPIRED)
                .await;
            return Err(PurchaseError::NotActive {
                status: slot.sale.status,
            });
        }

        if slot.sale.remaining_quantity == 0 {
            tracing::warn!(
                sale_id = slot.sale.id,
                "Purchase found no stock on an active sale; completing it"
            );
            self.end_locked(slot, SaleStatus::Completed, REASON_SOLD_OUT)
                .await;
            return Err(PurchaseError::SoldOut);
        }

        Ok(())
    }

    /// Steps 6 to 8, after the buyer has been charged.
    async fn commit_purchase(
        &self,
        slot: &mut SaleSlot,
        buyer: Uuid,
    ) -> Result<Receipt, PurchaseError> {
        let sale_id = slot.sale.id;
        let price = slot.sale.price;

        if let Err(e) = slot.sale.record_sale() {
            // Unreachable while the lock is held; still must not be swallowed
            tracing::error!(sale_id = sale_id, buyer = %buyer, error = %e, "Stock update failed after debit");
            return Err(PurchaseError::DeliveryFailedAfterDebit {
                sale_id,
                buyer,
                amount: price.value(),
                reason: e.to_string(),
            });
        }

        if let Err(e) = self
            .call(self.ports.repository.update_sale_quantity(
                sale_id,
                slot.sale.remaining_quantity,
                slot.sale.total_sold,
            ))
            .await
        {
            tracing::error!(
                sale_id = sale_id,
                remaining = slot.sale.remaining_quantity,
                total_sold = slot.sale.total_sold,
                error = %e,
                "Failed to persist sale counters"
            );
        }

        if let Err(e) = self
            .call(self.ports.inventory.deliver(buyer, &slot.sale.item))
            .await
        {
            tracing::error!(
                sale_id = sale_id,
                buyer = %buyer,
                amount = %price,
                error = %e,
                "Buyer charged but item delivery failed; operator action required"
            );
            return Err(PurchaseError::DeliveryFailedAfterDebit {
                sale_id,
                buyer,
                amount: price.value(),
                reason: e.to_string(),
            });
        }

        let receipt = Receipt {
            purchase_id: Uuid::new_v4(),
            sale_id,
            buyer,
            unit_price: price.value(),
            remaining: slot.sale.remaining_quantity,
            purchased_at: Utc::now(),
        };

        if let Err(e) = self
            .call(self.ports.repository.record_purchase(PurchaseRecord::from(&receipt)))
            .await
        {
            tracing::warn!(
                sale_id = sale_id,
                purchase_id = %receipt.purchase_id,
                error = %e,
                "Failed to record purchase history"
            );
        }

        tracing::info!(
            sale_id = sale_id,
            buyer = %buyer,
            unit_price = %price,
            remaining = receipt.remaining,
            "Purchase completed"
        );
        self.ports.notifier.notify(&SaleEvent::PurchaseMade {
            sale: slot.sale.clone(),
            buyer,
            unit_price: price.value(),
            remaining: receipt.remaining,
        });

        Ok(receipt)
    }
}
