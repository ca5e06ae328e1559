//! Soft-shutdown coordination
//!
//! Soft shutdown runs in two phases. Phase one is immediate: the shared
//! flag flips and every factory that was handed it refuses new work. Phase
//! two is the drain: a periodic check sums the in-flight counts of all
//! registered trackers and signals completion once every count is zero.

use crate::{ResourceTracker, ShutdownStatus, SoftShutdownFlag};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Coordinates the refuse-new-work flag and the drain check
pub struct SoftShutdownCoordinator {
    flag: SoftShutdownFlag,

    /// Registered subsystems, checked on every pass
    trackers: Mutex<Vec<Arc<dyn ResourceTracker>>>,

    check_interval: Duration,

    drain_complete: AtomicBool,
    drain_notify: Notify,
}

impl SoftShutdownCoordinator {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            flag: SoftShutdownFlag::new(),
            trackers: Mutex::new(Vec::new()),
            check_interval,
            drain_complete: AtomicBool::new(false),
            drain_notify: Notify::new(),
        }
    }

    /// Flag handle to hand to subsystems at construction
    pub fn flag(&self) -> SoftShutdownFlag {
        self.flag.clone()
    }

    /// Track a subsystem's in-flight work
    pub fn register(&self, tracker: Arc<dyn ResourceTracker>) {
        self.trackers.lock().push(tracker);
    }

    /// Begin the soft shutdown; returns false when one was already ongoing
    pub fn begin_soft_shutdown(&self) -> bool {
        if self.flag.set() {
            tracing::info!("soft shutdown initiated");
            true
        } else {
            false
        }
    }

    /// Current drain progress
    pub fn status(&self) -> ShutdownStatus {
        let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
        for tracker in self.trackers.lock().iter() {
            *counts.entry(tracker.label()).or_insert(0) += tracker.in_flight();
        }
        ShutdownStatus {
            soft_shutdown_ongoing: self.flag.is_set(),
            counts,
        }
    }

    /// Run one drain check; returns true once the drain is complete
    pub fn check(&self) -> bool {
        if !self.flag.is_set() {
            return false;
        }

        let status = self.status();
        if !status.all_clear() {
            tracing::debug!("soft shutdown still draining: {:?}", status.counts);
            return false;
        }

        if !self.drain_complete.swap(true, Ordering::SeqCst) {
            tracing::info!("soft shutdown drain complete");
        }
        self.drain_notify.notify_waiters();
        true
    }

    /// Start the periodic drain check; the task exits once drained
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(coordinator.check_interval);

            loop {
                interval.tick().await;

                if coordinator.check() {
                    return;
                }
            }
        })
    }

    /// Resolves once a soft shutdown has begun and every count has drained
    ///
    /// Driven by the periodic check; the caller typically awaits this and
    /// then stops the process.
    pub async fn drained(&self) {
        loop {
            // Create the notified future BEFORE checking completion.
            // This prevents lost wakeups between check and await.
            let notified = self.drain_notify.notified();

            if self.drain_complete.load(Ordering::SeqCst) {
                return;
            }

            notified.await;
        }
    }
}
