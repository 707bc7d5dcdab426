use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error};

use bluesnake_core::{DiscoveredUrl, DiscoverySource};

use crate::tracker::WorkTracker;

/// Bounded multi-producer FIFO feeding the single Processor. Sends never
/// block: producers run inside parser callbacks on worker tasks, and a
/// blocking send there would deadlock against the pool that must drain this
/// channel. A full channel drops the request and accounts for it.
pub struct DiscoveryChannel {
    tx: Mutex<Option<mpsc::Sender<DiscoveredUrl>>>,
    dropped: AtomicU64,
}

impl DiscoveryChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DiscoveredUrl>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(tx)),
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Non-blocking enqueue. The outstanding-work counter is incremented
    /// before the send attempt and decremented here on every failure path,
    /// so drops are never silent to `wait`.
    pub fn queue(&self, req: DiscoveredUrl, tracker: &WorkTracker) {
        tracker.add();
        let tx = match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(tx) = tx else {
            tracker.done();
            return;
        };
        match tx.try_send(req) {
            Ok(()) => {}
            Err(TrySendError::Full(req)) => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                tracker.done();
                if req.source == DiscoverySource::Initial {
                    error!(url = %req.url, "discovery channel full, dropped the initial seed");
                } else {
                    debug!(url = %req.url, "discovery channel full, dropped");
                }
            }
            Err(TrySendError::Closed(_)) => tracker.done(),
        }
    }

    /// Stop accepting new requests. Idempotent.
    pub fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}
