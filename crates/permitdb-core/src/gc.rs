//! Periodic garbage collection of released slot rows.
//!
//! One sweep per interval, starting immediately. A failing sweep is logged and
//! the loop keeps going; only the shutdown signal stops it.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Notify,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::{semaphore::CountingSemaphore, store::SlotStore, Result};

/// Totals reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcSummary {
    pub sweeps: u64,
    pub failed_sweeps: u64,
    pub deleted: u64,
}

/// Background sweeper around a shared semaphore.
#[derive(Debug)]
pub struct GarbageCollector<S> {
    semaphore: Arc<CountingSemaphore<S>>,
    interval: Duration,
}

impl<S: SlotStore> GarbageCollector<S> {
    /// `every` is clamped to at least one millisecond.
    pub fn new(semaphore: Arc<CountingSemaphore<S>>, every: Duration) -> Self {
        Self {
            semaphore,
            interval: every.max(Duration::from_millis(1)),
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single sweep.
    pub async fn run_once(&self) -> Result<u64> {
        self.semaphore.run_garbage_collection().await
    }

    /// Sweep every interval until `shutdown` is notified.
    ///
    /// Use `Notify::notify_one` to stop the loop; the permit is kept if the
    /// loop is mid-sweep when the signal arrives.
    pub async fn run(&self, shutdown: &Notify) -> GcSummary {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = GcSummary::default();

        info!(interval_ms = self.interval.as_millis(), "Garbage collector started");

        loop {
            tokio::select! {
                () = shutdown.notified() => break,
                _ = ticker.tick() => {
                    summary.sweeps += 1;
                    match self.run_once().await {
                        Ok(deleted) => {
                            summary.deleted += deleted;
                            debug!(deleted, sweep = summary.sweeps, "Garbage collection sweep finished");
                        }
                        Err(error) => {
                            summary.failed_sweeps += 1;
                            error!(%error, sweep = summary.sweeps, "Garbage collection sweep failed");
                        }
                    }
                }
            }
        }

        info!(
            sweeps = summary.sweeps,
            deleted = summary.deleted,
            failed = summary.failed_sweeps,
            "Garbage collector stopped"
        );
        summary
    }
}
