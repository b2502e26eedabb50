//! Per-sale deadline timers
//!
//! Each live sale owns at most one timer: a start deadline while pending and
//! an end deadline while active. A timer is a tokio task sleeping until the
//! target instant. It only holds a weak reference to the manager and carries
//! a generation number; the manager ignores a firing whose generation no
//! longer matches the one stored with the sale.

use chrono::{DateTime, Utc};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::AbortHandle;

use crate::domain::format_std_duration;
use crate::manager::SaleManager;

/// Which lifecycle edge a timer drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineKind {
    Start,
    End,
}

/// Handle to a pending deadline
#[derive(Debug)]
pub struct DeadlineTimer {
    kind: DeadlineKind,
    generation: u64,
    fires_at: DateTime<Utc>,
    handle: AbortHandle,
}

impl DeadlineTimer {
    pub fn kind(&self) -> DeadlineKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fires_at(&self) -> DateTime<Utc> {
        self.fires_at
    }

    /// Abort the sleeping task. Dropping the timer without calling this
    /// leaves the task running.
    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// Time left until `at`, zero if already past
pub fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Spawn a timer that calls back into the manager at `fires_at`.
pub(crate) fn schedule(
    manager: Weak<SaleManager>,
    sale_id: i64,
    kind: DeadlineKind,
    fires_at: DateTime<Utc>,
    generation: u64,
) -> DeadlineTimer {
    let delay = delay_until(fires_at, Utc::now());

    tracing::debug!(
        sale_id = sale_id,
        kind = ?kind,
        delay_ms = delay.as_millis() as u64,
        due_in = %format_std_duration(delay),
        "Scheduling sale deadline"
    );

    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match manager.upgrade() {
            Some(manager) => manager.on_deadline(sale_id, kind, generation).await,
            None => tracing::debug!(sale_id = sale_id, "Sale manager dropped before deadline"),
        }
    });

    DeadlineTimer {
        kind,
        generation,
        fires_at,
        handle: task.abort_handle(),
    }
}
