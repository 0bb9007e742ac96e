//! Periodic snapshot refresh bound to a mounted dashboard view.
//!
//! The refresh task is the only writer of its snapshot slot. Every write
//! happens under the slot lock and only while the slot is marked active, so
//! once [`RefreshHandle::cancel`] returns no further mutation is possible,
//! even if the task was in the middle of a fetch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::metrics::MetricsSnapshot;
use crate::source::{MetricsSource, MetricsSourceError};

pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(30);
pub const MIN_REFRESH_PERIOD: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub(crate) struct SnapshotSlot {
    active: bool,
    snapshot: MetricsSnapshot,
    stats: RefreshStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Scheduled ticks completed after the initial population.
    pub ticks: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

pub(crate) type SharedSlot = Arc<Mutex<SnapshotSlot>>;

pub(crate) fn new_slot() -> SharedSlot {
    Arc::new(Mutex::new(SnapshotSlot {
        active: true,
        ..SnapshotSlot::default()
    }))
}

pub(crate) fn lock_slot(slot: &SharedSlot) -> MutexGuard<'_, SnapshotSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SnapshotSlot {
    pub(crate) fn snapshot(&self) -> &MetricsSnapshot {
        &self.snapshot
    }

    pub(crate) fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Applies a fetch result. A failure keeps the previous snapshot.
    /// Returns false when the slot has been deactivated.
    pub(crate) fn apply(
        &mut self,
        result: Result<MetricsSnapshot, MetricsSourceError>,
        scheduled: bool,
    ) -> bool {
        if !self.active {
            return false;
        }
        if scheduled {
            self.stats.ticks += 1;
        }
        match result {
            Ok(snapshot) => {
                self.snapshot = snapshot;
                self.stats.last_error = None;
            }
            Err(error) => {
                warn!(reason = %error, scheduled, "metrics refresh failed; keeping previous snapshot");
                self.stats.failures += 1;
                self.stats.last_error = Some(error.to_string());
            }
        }
        true
    }
}

/// Scoped ownership of one refresh timer. Dropping the handle cancels it.
#[derive(Debug)]
pub struct RefreshHandle {
    slot: SharedSlot,
    task: Option<JoinHandle<()>>,
    live: Option<LiveTimerGuard>,
}

impl RefreshHandle {
    /// Starts the periodic refresh. The first scheduled tick fires one
    /// `period` from now; the initial population is the caller's job.
    pub(crate) fn spawn(
        source: Arc<dyn MetricsSource>,
        slot: SharedSlot,
        period: Duration,
        live_timers: Arc<AtomicUsize>,
    ) -> Self {
        let period = period.max(MIN_REFRESH_PERIOD);
        live_timers.fetch_add(1, Ordering::SeqCst);
        let live = LiveTimerGuard(live_timers);
        let task_slot = Arc::clone(&slot);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !lock_slot(&task_slot).active {
                    break;
                }
                let result = source.fetch(Utc::now()).await;
                if !lock_slot(&task_slot).apply(result, true) {
                    break;
                }
                debug!("metrics refresh tick applied");
            }
        });

        Self {
            slot,
            task: Some(task),
            live: Some(live),
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    #[must_use]
    pub fn stats(&self) -> RefreshStats {
        lock_slot(&self.slot).stats().clone()
    }

    /// Stops the timer. Safe to call more than once. The live-timer count
    /// drops before this returns.
    pub fn cancel(&mut self) {
        lock_slot(&self.slot).active = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        drop(self.live.take());
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug)]
struct LiveTimerGuard(Arc<AtomicUsize>);

impl Drop for LiveTimerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
