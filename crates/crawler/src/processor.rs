use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use bluesnake_core::{DiscoveredUrl, RobotsTxtMode, UrlAction};
use bluesnake_frontier::{hash_normalized, normalize_url};

use crate::engine::Engine;
use crate::pool::Task;
use crate::tracker::WorkGuard;
use crate::worker::run_fetch_task;

/// The single serializing consumer of the discovery channel. This is the
/// only code path that tests-and-sets the visited hash for discovered URLs,
/// which is what makes the whole decision sequence race-free without
/// per-URL locks.
pub async fn run_processor(engine: Arc<Engine>, mut rx: mpsc::Receiver<DiscoveredUrl>) {
    let mut shutdown = engine.shutdown_tx.subscribe();
    loop {
        tokio::select! {
            req = rx.recv() => match req {
                Some(req) => process_one(&engine, req).await,
                None => break,
            },
            _ = shutdown.recv() => {
                // Cancelled: refuse new sends, then settle what's buffered
                // so wait() can observe zero.
                rx.close();
                while let Some(_req) = rx.recv().await {
                    engine.tracker.done();
                }
                break;
            }
        }
    }
    debug!("processor finished");
}

async fn process_one(engine: &Arc<Engine>, req: DiscoveredUrl) {
    // One terminal decrement no matter which exit is taken below.
    let guard = WorkGuard::new(Arc::clone(&engine.tracker));

    let action = engine.store.get_or_put_action(&req.url, |url| {
        match &engine.callbacks.on_url_discovered {
            Some(cb) => cb(url),
            None => UrlAction::Crawl,
        }
    });
    if action == UrlAction::Skip {
        return;
    }

    if engine.config.max_depth > 0 && req.depth > engine.config.max_depth {
        debug!(url = %req.url, depth = req.depth, "over max depth");
        return;
    }

    let normalized = match normalize_url(&req.url) {
        Ok(n) => n,
        Err(e) => {
            debug!(url = %req.url, "unparseable URL: {e}");
            return;
        }
    };
    let Ok(url) = Url::parse(&normalized) else {
        return;
    };
    if !engine.filters.allows(&url) {
        debug!(url = %url, "rejected by URL filters");
        return;
    }

    // Robots I/O happens here, in the processor's async context, never in
    // parser callbacks.
    if engine.config.robots_txt_mode != RobotsTxtMode::Ignore {
        match engine.robots.allowed(&url).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(url = %url, "blocked by robots.txt");
                return;
            }
            Err(e) => {
                warn!(url = %url, "robots check failed, allowing: {e}");
            }
        }
    }

    let hash = hash_normalized(&normalized);
    if !engine.store.visit_if_not_visited(hash) {
        return;
    }

    if !engine.budget.try_acquire() {
        // Budget exhausted: this URL and everything after it stays pending.
        // The step above marked it visited; roll that back or a later
        // discovery of the same URL would vanish instead of staying pending.
        engine.store.unmark_visited(hash);
        if let Ok(mut pending) = engine.pending.lock() {
            pending.push(req);
        }
        return;
    }

    if action == UrlAction::RecordOnly {
        return;
    }

    // Hand the accounting unit to the fetch task: its own guard decrements
    // on completion, or on drop if the pool rejects it.
    guard.disarm();
    let task_guard = WorkGuard::new(Arc::clone(&engine.tracker));
    let task_engine = Arc::clone(engine);
    let task: Task = Box::pin(async move {
        let _guard = task_guard;
        run_fetch_task(task_engine, req, normalized).await;
    });

    // This send may block on a full queue; that is the global backpressure
    // point.
    if let Err(e) = engine.pool.submit(task).await {
        debug!(url = %url, "pool rejected task: {e}");
    }
}
