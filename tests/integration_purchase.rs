//! Purchase integration tests

use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use flash_sale::domain::{PurchaseError, SaleEvent, SaleStatus};
use flash_sale::manager::REASON_SOLD_OUT;
use flash_sale::ports::{InMemoryWallet, PortError};

mod common;
use common::{diamond, sale_command, TestHarness};

fn open_for(duration_secs: u64) -> (Duration, Duration) {
    (Duration::ZERO, Duration::from_secs(duration_secs))
}

#[tokio::test]
async fn test_sell_out_between_two_buyers() {
    let mut harness = TestHarness::new();
    let (delay, duration) = open_for(60);
    let sale = harness
        .manager
        .create_sale(sale_command(1, delay, duration))
        .await
        .unwrap();

    let a = harness.funded_buyer(500);
    let b = harness.funded_buyer(500);

    let (ra, rb) = tokio::join!(
        {
            let manager = harness.manager.clone();
            tokio::spawn(async move { manager.attempt_purchase(a, sale.id).await })
        },
        {
            let manager = harness.manager.clone();
            tokio::spawn(async move { manager.attempt_purchase(b, sale.id).await })
        }
    );
    let results = [ra.unwrap(), rb.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser, &PurchaseError::SoldOut);

    let archived = harness.repository.archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].status, SaleStatus::Completed);
    assert_eq!(archived[0].remaining_quantity, 0);
    assert_eq!(archived[0].total_sold, 1);

    // Only the winner paid
    let total = harness.wallet.balance_of(a) + harness.wallet.balance_of(b);
    assert_eq!(total, Decimal::from(900));

    let ended: Vec<_> = harness
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SaleEvent::SaleEnded { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![REASON_SOLD_OUT.to_string()]);
}

#[tokio::test]
async fn test_no_oversell_under_contention() {
    const BUYERS: usize = 40;
    const STOCK: u32 = 7;

    let harness = TestHarness::builder()
        .wallet(InMemoryWallet::new().with_latency(Duration::from_millis(2)))
        .build();
    let (delay, duration) = open_for(60);
    let sale = harness
        .manager
        .create_sale(sale_command(STOCK, delay, duration))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..BUYERS {
        let buyer = harness.funded_buyer(1_000);
        let manager = harness.manager.clone();
        handles.push(tokio::spawn(async move {
            manager.attempt_purchase(buyer, sale.id).await
        }));
    }

    let mut successes = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(PurchaseError::SoldOut) => sold_out += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, STOCK as usize);
    assert_eq!(sold_out, BUYERS - STOCK as usize);
    assert_eq!(harness.inventory.delivered_count(), STOCK as usize);
    assert_eq!(harness.repository.purchases().len(), STOCK as usize);

    let archived = harness.repository.archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].status, SaleStatus::Completed);
    assert_eq!(archived[0].remaining_quantity, 0);
    assert_eq!(archived[0].total_sold, STOCK);
    assert!(archived[0].counters_consistent());
}

#[tokio::test]
async fn test_unrelated_sales_sell_independently() {
    let harness = TestHarness::new();
    let (delay, duration) = open_for(60);
    let first = harness
        .manager
        .create_sale(sale_command(1, delay, duration))
        .await
        .unwrap();
    let second = harness
        .manager
        .create_sale(sale_command(1, delay, duration))
        .await
        .unwrap();

    let buyer = harness.funded_buyer(200);
    harness.manager.attempt_purchase(buyer, first.id).await.unwrap();
    harness.manager.attempt_purchase(buyer, second.id).await.unwrap();

    assert_eq!(harness.wallet.balance_of(buyer), Decimal::ZERO);
    assert_eq!(harness.inventory.items_of(buyer), vec![diamond(), diamond()]);
    assert_eq!(harness.manager.live_count(), 0);
}

#[tokio::test]
async fn test_rejections_leave_no_trace() {
    let mut harness = TestHarness::builder().inventory_slots(1).build();
    let (delay, duration) = open_for(60);
    let sale = harness
        .manager
        .create_sale(sale_command(3, delay, duration))
        .await
        .unwrap();
    harness.drain_events();

    let poor = harness.funded_buyer(99);
    let err = harness.manager.attempt_purchase(poor, sale.id).await.unwrap_err();
    assert_eq!(
        err,
        PurchaseError::InsufficientFunds {
            required: Decimal::from(100),
            available: Decimal::from(99),
        }
    );
    assert_eq!(harness.wallet.balance_of(poor), Decimal::from(99));

    let full = harness.funded_buyer(1_000);
    harness.inventory.fill(full, vec![diamond()]);
    let err = harness.manager.attempt_purchase(full, sale.id).await.unwrap_err();
    assert_eq!(err, PurchaseError::InventoryFull);
    assert_eq!(harness.wallet.balance_of(full), Decimal::from(1_000));

    let err = harness
        .manager
        .attempt_purchase(Uuid::new_v4(), 404)
        .await
        .unwrap_err();
    assert_eq!(err, PurchaseError::NotFound(404));

    let live = harness.manager.sale_by_id(sale.id).await.unwrap();
    assert_eq!(live.remaining_quantity, 3);
    assert_eq!(live.total_sold, 0);
    assert!(harness.drain_events().is_empty());
}

#[tokio::test]
async fn test_delivery_failure_after_debit_is_reported() {
    let harness = TestHarness::new();
    let (delay, duration) = open_for(60);
    let sale = harness
        .manager
        .create_sale(sale_command(1, delay, duration))
        .await
        .unwrap();

    let buyer = harness.funded_buyer(150);
    harness.inventory.set_fail_deliveries(true);

    let err = harness.manager.attempt_purchase(buyer, sale.id).await.unwrap_err();
    assert!(err.requires_operator());
    match err {
        PurchaseError::DeliveryFailedAfterDebit {
            sale_id,
            buyer: charged,
            amount,
            ..
        } => {
            assert_eq!(sale_id, sale.id);
            assert_eq!(charged, buyer);
            assert_eq!(amount, Decimal::from(100));
        }
        other => panic!("expected DeliveryFailedAfterDebit, got {:?}", other),
    }

    // Money and stock both moved; the last unit still completes the sale
    assert_eq!(harness.wallet.balance_of(buyer), Decimal::from(50));
    let archived = harness.repository.archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].status, SaleStatus::Completed);
    assert_eq!(archived[0].total_sold, 1);
}

#[tokio::test]
async fn test_currency_outage_aborts_before_debit() {
    let harness = TestHarness::new();
    let (delay, duration) = open_for(60);
    let sale = harness
        .manager
        .create_sale(sale_command(2, delay, duration))
        .await
        .unwrap();

    let buyer = harness.funded_buyer(500);
    harness.wallet.set_unavailable(true);

    let err = harness.manager.attempt_purchase(buyer, sale.id).await.unwrap_err();
    assert!(matches!(err, PurchaseError::Port(PortError::Unavailable(_))));

    harness.wallet.set_unavailable(false);
    assert_eq!(harness.wallet.balance_of(buyer), Decimal::from(500));
    assert_eq!(
        harness.manager.sale_by_id(sale.id).await.unwrap().remaining_quantity,
        2
    );
}

#[tokio::test]
async fn test_slow_currency_times_out() {
    let harness = TestHarness::builder()
        .wallet(InMemoryWallet::new().with_latency(Duration::from_millis(200)))
        .port_timeout(Duration::from_millis(50))
        .build();
    let (delay, duration) = open_for(60);
    let sale = harness
        .manager
        .create_sale(sale_command(2, delay, duration))
        .await
        .unwrap();

    let buyer = harness.funded_buyer(500);
    let err = harness.manager.attempt_purchase(buyer, sale.id).await.unwrap_err();

    // The balance read times out, so nothing was charged
    assert_eq!(err, PurchaseError::Port(PortError::Timeout(50)));
    assert_eq!(
        harness.manager.sale_by_id(sale.id).await.unwrap().remaining_quantity,
        2
    );
}

#[tokio::test]
async fn test_purchase_after_end_time_is_refused() {
    let mut harness = TestHarness::new();
    let sale = harness
        .manager
        .create_sale(sale_command(2, Duration::ZERO, Duration::from_millis(300)))
        .await
        .unwrap();

    // Keep the end timer from winning the race
    harness.manager.shutdown().await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let buyer = harness.funded_buyer(500);
    let err = harness.manager.attempt_purchase(buyer, sale.id).await.unwrap_err();
    assert_eq!(
        err,
        PurchaseError::NotActive {
            status: SaleStatus::Expired
        }
    );
    assert_eq!(harness.wallet.balance_of(buyer), Decimal::from(500));

    let types = harness.drain_event_types();
    assert_eq!(types.last(), Some(&"SaleEnded"));

    // Later attempts see the recorded outcome
    let err = harness.manager.attempt_purchase(buyer, sale.id).await.unwrap_err();
    assert_eq!(
        err,
        PurchaseError::NotActive {
            status: SaleStatus::Expired
        }
    );
}

#[tokio::test]
async fn test_failed_counter_persistence_does_not_undo_purchase() {
    let harness = TestHarness::new();
    let (delay, duration) = open_for(60);
    let sale = harness
        .manager
        .create_sale(sale_command(3, delay, duration))
        .await
        .unwrap();
    harness.repository.set_fail_quantity_updates(true);

    let buyer = harness.funded_buyer(100);
    let receipt = harness.manager.attempt_purchase(buyer, sale.id).await.unwrap();

    assert_eq!(receipt.remaining, 2);
    assert_eq!(
        harness.manager.sale_by_id(sale.id).await.unwrap().remaining_quantity,
        2
    );
    // The stored row lags behind the in-memory counter
    assert_eq!(
        harness.repository.stored_sale(sale.id).unwrap().remaining_quantity,
        3
    );
}

/// One buyer racing themselves across two sales
async fn buy_from_two_sales(harness: &TestHarness, buyer: Uuid) -> [Result<(), PurchaseError>; 2] {
    let (delay, duration) = open_for(60);
    let mut sale_ids = Vec::new();
    for _ in 0..2 {
        let sale = harness
            .manager
            .create_sale(sale_command(2, delay, duration))
            .await
            .unwrap();
        sale_ids.push(sale.id);
    }

    let (first, second) = tokio::join!(
        {
            let manager = harness.manager.clone();
            let sale_id = sale_ids[0];
            tokio::spawn(async move { manager.attempt_purchase(buyer, sale_id).await })
        },
        {
            let manager = harness.manager.clone();
            let sale_id = sale_ids[1];
            tokio::spawn(async move { manager.attempt_purchase(buyer, sale_id).await })
        }
    );
    [first.unwrap().map(|_| ()), second.unwrap().map(|_| ())]
}

#[tokio::test]
async fn test_buyer_cannot_spend_same_funds_on_two_sales() {
    let harness = TestHarness::builder()
        .wallet(InMemoryWallet::new().with_latency(Duration::from_millis(50)))
        .build();
    let buyer = harness.funded_buyer(150);

    let results = buy_from_two_sales(&harness, buyer).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(
        rejected,
        &PurchaseError::InsufficientFunds {
            required: Decimal::from(100),
            available: Decimal::from(50),
        }
    );
    assert_eq!(harness.wallet.balance_of(buyer), Decimal::from(50));
    assert_eq!(harness.inventory.delivered_count(), 1);

    let sold: u32 = harness
        .repository
        .stored_sales()
        .iter()
        .map(|sale| sale.total_sold)
        .sum();
    assert_eq!(sold, 1);
}

#[tokio::test]
async fn test_last_inventory_slot_is_not_sold_twice() {
    let harness = TestHarness::builder()
        .wallet(InMemoryWallet::new().with_latency(Duration::from_millis(50)))
        .inventory_slots(1)
        .build();
    let buyer = harness.funded_buyer(1_000);

    let results = buy_from_two_sales(&harness, buyer).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(rejected, &PurchaseError::InventoryFull);
    assert_eq!(harness.wallet.balance_of(buyer), Decimal::from(900));
    assert_eq!(harness.inventory.items_of(buyer), vec![diamond()]);
}
