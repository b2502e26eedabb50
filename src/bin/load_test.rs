//! Purchase Load Test
//!
//! Fires N concurrent buyers at one sale with K units and checks that
//! nothing is oversold.
//!
//! Run with: cargo run --bin load_test --release -- --buyers 500 --stock 50

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rust_decimal::Decimal;
use uuid::Uuid;

use flash_sale::domain::{ItemSnapshot, Price};
use flash_sale::manager::{Actor, CreateSaleCommand, ManagerConfig, SaleManager, SalePorts};
use flash_sale::ports::{ChannelNotifier, InMemoryInventory, InMemorySaleRepository, InMemoryWallet};
use flash_sale::SaleEvent;

const UNIT_PRICE: i64 = 100;

fn arg_value(args: &[String], flag: &str, default: u32) -> u32 {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let buyers = arg_value(&args, "--buyers", 500);
    let stock = arg_value(&args, "--stock", 50);
    if stock == 0 {
        anyhow::bail!("--stock must be positive");
    }

    println!("Load Test - {} buyers racing for {} units", buyers, stock);

    let repository = Arc::new(InMemorySaleRepository::new());
    let wallet = Arc::new(InMemoryWallet::new().with_latency(Duration::from_millis(1)));
    let inventory = Arc::new(InMemoryInventory::default());
    let (notifier, mut events) = ChannelNotifier::new();

    let manager = SaleManager::new(
        ManagerConfig::default(),
        SalePorts {
            repository: repository.clone(),
            currency: wallet.clone(),
            inventory: inventory.clone(),
            notifier: Arc::new(notifier),
        },
    );

    let sale = manager
        .create_sale(CreateSaleCommand::new(
            Actor::new(Uuid::nil(), "load_test"),
            ItemSnapshot::new(serde_json::json!({ "material": "DIAMOND" })),
            Price::from_integer(UNIT_PRICE)?,
            stock,
            Duration::ZERO,
            Duration::from_secs(600),
        ))
        .await?;

    // Roughly one buyer in five cannot afford the item
    let mut rng = rand::thread_rng();
    let buyer_ids: Vec<Uuid> = (0..buyers).map(|_| Uuid::new_v4()).collect();
    for buyer in &buyer_ids {
        let funds = if rng.gen_bool(0.2) {
            rng.gen_range(0..UNIT_PRICE)
        } else {
            rng.gen_range(UNIT_PRICE..UNIT_PRICE * 10)
        };
        wallet.deposit(*buyer, Decimal::from(funds));
    }

    let start = Instant::now();
    let mut handles = Vec::with_capacity(buyer_ids.len());
    for buyer in buyer_ids {
        let manager = manager.clone();
        let sale_id = sale.id;
        handles.push(tokio::spawn(async move {
            manager.attempt_purchase(buyer, sale_id).await
        }));
    }

    let mut success_count = 0u32;
    let mut failures: BTreeMap<&'static str, u32> = BTreeMap::new();
    for handle in handles {
        match handle.await? {
            Ok(_) => success_count += 1,
            Err(e) => *failures.entry(e.error_code()).or_default() += 1,
        }
    }
    let elapsed = start.elapsed();

    let mut ended_events = 0u32;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SaleEvent::SaleEnded { .. }) {
            ended_events += 1;
        }
    }

    println!("\n=== Load Test Results ===");
    println!("Buyers: {}", buyers);
    println!("Stock: {}", stock);
    println!("Successful: {}", success_count);
    for (code, count) in &failures {
        println!("  {:<28} {}", code, count);
    }
    println!("Delivered: {}", inventory.delivered_count());
    println!("Recorded purchases: {}", repository.purchases().len());
    println!("Sale ended events: {}", ended_events);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!(
        "Rate: {:.0} attempts/sec",
        buyers as f64 / elapsed.as_secs_f64()
    );

    if success_count > stock {
        anyhow::bail!("oversold: {} purchases for {} units", success_count, stock);
    }
    if success_count as usize != inventory.delivered_count() {
        anyhow::bail!(
            "{} purchases but {} deliveries",
            success_count,
            inventory.delivered_count()
        );
    }

    println!("\nNo oversell detected");
    Ok(())
}
