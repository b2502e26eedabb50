//! Scheduled Jobs
//!
//! Background work that keeps sales moving through their lifecycle:
//! per-sale deadline timers (`deadline`), the periodic sweep that catches
//! missed or drifted timers, and startup reconciliation of persisted sales.

pub mod deadline;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::manager::{DeadlineAction, RestoreOutcome, SaleManager};
use crate::ports::PortError;

/// Configuration for the sale scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval of the expiry sweep (default: 1 second)
    pub sweep_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Sale Scheduler - reconciles persisted sales and runs the sweep
pub struct SaleScheduler {
    manager: Arc<SaleManager>,
    config: SchedulerConfig,
}

impl SaleScheduler {
    /// Create a new scheduler
    pub fn new(manager: Arc<SaleManager>) -> Self {
        Self {
            manager,
            config: SchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(manager: Arc<SaleManager>, config: SchedulerConfig) -> Self {
        Self { manager, config }
    }

    pub fn manager(&self) -> &Arc<SaleManager> {
        &self.manager
    }

    // =========================================================================
    // Startup reconciliation
    // =========================================================================

    /// Load every non-terminal sale from the repository, register it, and
    /// either apply its overdue deadlines or arm its next timer.
    pub async fn reconcile(&self) -> Result<ReconcileReport, JobError> {
        let sales = self
            .manager
            .call(self.manager.repository().load_active_sales())
            .await?;

        let mut report = ReconcileReport {
            loaded: sales.len(),
            ..ReconcileReport::default()
        };

        for sale in sales {
            let sale_id = sale.id;
            match self.manager.restore_sale(sale).await {
                RestoreOutcome::Scheduled(_) => report.scheduled.push(sale_id),
                RestoreOutcome::Reconciled(action) => {
                    if matches!(
                        action,
                        DeadlineAction::Started | DeadlineAction::StartedAndExpired
                    ) {
                        report.started.push(sale_id);
                    }
                    if matches!(
                        action,
                        DeadlineAction::Expired | DeadlineAction::StartedAndExpired
                    ) {
                        report.expired.push(sale_id);
                    }
                }
                RestoreOutcome::Skipped => report.skipped.push(sale_id),
            }
        }

        tracing::info!(
            loaded = report.loaded,
            scheduled = report.scheduled.len(),
            started = report.started.len(),
            expired = report.expired.len(),
            skipped = report.skipped.len(),
            "Sales reconciled"
        );

        Ok(report)
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    /// Start the sweep loop in the background.
    /// Returns a handle that can be used to abort the scheduler.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the sweep loop
    async fn run(&self) {
        tracing::info!(
            interval_ms = self.config.sweep_interval.as_millis() as u64,
            "Sale scheduler started"
        );

        let mut sweep_interval = interval(self.config.sweep_interval);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            sweep_interval.tick().await;
            let report = self.sweep_once().await;
            if report.touched() {
                tracing::debug!(
                    started = report.started.len(),
                    expired = report.expired.len(),
                    "Sweep applied overdue deadlines"
                );
            }
        }
    }

    /// Apply overdue deadlines to every live sale once (for manual trigger
    /// or testing). One sale's failure never stops the pass.
    pub async fn sweep_once(&self) -> SweepReport {
        let now = Utc::now();
        let mut report = SweepReport {
            checked: 0,
            started: Vec::new(),
            expired: Vec::new(),
            completed_at: now,
        };

        for sale_id in self.manager.live_ids() {
            report.checked += 1;

            // Each transition runs in its own task so a panic is contained
            let manager = Arc::clone(&self.manager);
            let result =
                tokio::spawn(async move { manager.enforce_deadlines(sale_id, now).await }).await;

            match result {
                Ok(DeadlineAction::None) => {}
                Ok(DeadlineAction::Started) => report.started.push(sale_id),
                Ok(DeadlineAction::Expired) => report.expired.push(sale_id),
                Ok(DeadlineAction::StartedAndExpired) => {
                    report.started.push(sale_id);
                    report.expired.push(sale_id);
                }
                Err(e) => {
                    tracing::error!(sale_id = sale_id, error = %e, "Sweep failed for sale");
                }
            }
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from one sweep pass
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub checked: usize,
    pub started: Vec<i64>,
    pub expired: Vec<i64>,
    pub completed_at: DateTime<Utc>,
}

impl SweepReport {
    pub fn touched(&self) -> bool {
        !self.started.is_empty() || !self.expired.is_empty()
    }
}

/// Report from startup reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub loaded: usize,
    pub scheduled: Vec<i64>,
    pub started: Vec<i64>,
    pub expired: Vec<i64>,
    pub skipped: Vec<i64>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PortError),
}

// =========================================================================
// Tests
// =========================================================================
