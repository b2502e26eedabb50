//! flashSale - timed, limited-stock sale service
//!
//! Runs the sale manager and scheduler against the in-memory ports,
//! optionally opening a demo sale from `DEMO_SALE_*` variables.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use flash_sale::config::DemoSaleConfig;
use flash_sale::domain::ItemSnapshot;
use flash_sale::jobs::SaleScheduler;
use flash_sale::manager::{Actor, CreateSaleCommand, SaleManager, SalePorts};
use flash_sale::ports::{
    FanoutNotifier, InMemoryInventory, InMemorySaleRepository, InMemoryWallet, TracingNotifier,
};
use flash_sale::{AppError, Config, ErrorResponse};

/// Initialize tracing/logging
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "flash_sale=debug".into());

    if config.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_ports() -> SalePorts {
    let notifier = FanoutNotifier::new().with(Arc::new(TracingNotifier));

    SalePorts {
        repository: Arc::new(InMemorySaleRepository::new()),
        currency: Arc::new(InMemoryWallet::new()),
        inventory: Arc::new(InMemoryInventory::default()),
        notifier: Arc::new(notifier),
    }
}

async fn open_demo_sale(manager: &SaleManager, demo: &DemoSaleConfig) -> Result<(), AppError> {
    let command = CreateSaleCommand::parse(
        Actor::new(Uuid::nil(), "console"),
        ItemSnapshot::new(serde_json::json!({ "material": demo.item })),
        &demo.price,
        &demo.start_delay,
        demo.quantity,
        &demo.duration,
    )?;

    let sale = manager.create_sale(command).await?;
    tracing::info!(sale_id = sale.id, status = %sale.status, "Demo sale opened");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config);

    tracing::info!(
        environment = %config.environment,
        max_active_sales = config.max_active_sales,
        "Starting flashSale service"
    );

    let manager = SaleManager::new(config.manager_config(), build_ports());
    let scheduler = SaleScheduler::with_config(manager.clone(), config.scheduler_config());

    // Pick up sales left over from a previous run before anything new
    scheduler.reconcile().await.map_err(AppError::from)?;

    if let Some(demo) = &config.demo_sale {
        if let Err(e) = open_demo_sale(&manager, demo).await {
            let body = ErrorResponse::from(&e);
            tracing::error!(
                error_code = %body.error_code,
                details = ?body.details,
                "Failed to open demo sale: {}",
                body.error
            );
        }
    }

    let sweep = scheduler.start();

    shutdown_signal().await;

    // Cleanup
    tracing::info!("Service shutting down...");
    sweep.abort();
    manager.shutdown().await;
    tracing::info!(live_sales = manager.live_count(), "Timers stopped. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
