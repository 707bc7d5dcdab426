use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// The termination-detection primitive behind `wait`: one counter,
/// incremented before every discovery-channel send attempt and decremented
/// at exactly one terminal outcome per request.
pub struct WorkTracker {
    count: AtomicUsize,
    notify: Notify,
}

impl Default for WorkTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkTracker {
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn done(&self) {
        let prev = self.count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "work counter underflow");
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Block until every outstanding unit of work has reached a terminal
    /// outcome. The notified future is created before the counter check so a
    /// concurrent final `done` can't slip between them.
    pub async fn wait_zero(&self) {
        loop {
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Scoped decrement: exactly one `done` per guard, on drop or explicit
/// handoff. Dropping an armed guard decrements even on a panic path.
pub struct WorkGuard {
    tracker: Arc<WorkTracker>,
    armed: bool,
}

impl WorkGuard {
    pub fn new(tracker: Arc<WorkTracker>) -> Self {
        Self {
            tracker,
            armed: true,
        }
    }

    /// Transfer responsibility for the decrement elsewhere.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.armed {
            self.tracker.done();
        }
    }
}
