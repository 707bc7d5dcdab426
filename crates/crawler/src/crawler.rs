use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use bluesnake_core::{
    CompletionReason, CrawlConfig, CrawlError, CrawlSummary, DiscoveredUrl, DiscoverySource,
    PageResult, ResourceResult, UrlAction,
};
use bluesnake_discovery::SitemapReader;
use bluesnake_fetcher::{fetch_fn, Fetcher};
use bluesnake_frontier::{PersistentQueue, VisitStore};
use bluesnake_parser::{ContentHasher, SiteScope};
use bluesnake_robots::RobotsGate;

use crate::channel::DiscoveryChannel;
use crate::engine::{Budget, CallbackSet, Engine};
use crate::filters::UrlFilters;
use crate::pool::WorkerPool;
use crate::processor::run_processor;
use crate::tracker::{WorkGuard, WorkTracker};

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_TERMINAL: u8 = 2;

/// Single-use crawl session. Register callbacks, `start` once, `wait` for
/// the summary; `stop` cancels from any task.
pub struct Crawler {
    config: CrawlConfig,
    state: AtomicU8,
    callbacks: Mutex<CallbackSet>,
    engine: OnceLock<Arc<Engine>>,
    processor: Mutex<Option<JoinHandle<()>>>,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(STATE_IDLE),
            callbacks: Mutex::new(CallbackSet::default()),
            engine: OnceLock::new(),
            processor: Mutex::new(None),
        }
    }

    fn register<F>(&self, set: F) -> Result<(), CrawlError>
    where
        F: FnOnce(&mut CallbackSet),
    {
        if self.state.load(Ordering::SeqCst) != STATE_IDLE {
            return Err(CrawlError::Config(
                "callbacks must be registered before start".into(),
            ));
        }
        match self.callbacks.lock() {
            Ok(mut callbacks) => {
                set(&mut callbacks);
                Ok(())
            }
            Err(_) => Err(CrawlError::Config("callback registry poisoned".into())),
        }
    }

    /// Route each unique URL exactly once. The first return value for a URL
    /// is memoized; the callback is never consulted twice for the same URL.
    pub fn on_url_discovered<F>(&self, f: F) -> Result<(), CrawlError>
    where
        F: Fn(&str) -> UrlAction + Send + Sync + 'static,
    {
        self.register(|set| set.on_url_discovered = Some(Arc::new(f)))
    }

    /// HTML responses only.
    pub fn on_page_crawled<F>(&self, f: F) -> Result<(), CrawlError>
    where
        F: Fn(PageResult) + Send + Sync + 'static,
    {
        self.register(|set| set.on_page_crawled = Some(Arc::new(f)))
    }

    /// Non-HTML responses only.
    pub fn on_resource_visit<F>(&self, f: F) -> Result<(), CrawlError>
    where
        F: Fn(ResourceResult) + Send + Sync + 'static,
    {
        self.register(|set| set.on_resource_visit = Some(Arc::new(f)))
    }

    /// Invoked exactly once, when `wait` completes.
    pub fn on_crawl_complete<F>(&self, f: F) -> Result<(), CrawlError>
    where
        F: Fn(CrawlSummary) + Send + Sync + 'static,
    {
        self.register(|set| set.on_crawl_complete = Some(Arc::new(f)))
    }

    /// Derive the root domain from the seed, spawn the Processor and (when
    /// enabled) the sitemap loader, and queue the resume seeds followed by
    /// the initial seed. May be called exactly once.
    pub fn start(&self, seed_url: &str) -> Result<(), CrawlError> {
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CrawlError::Config("start may be called exactly once".into()));
        }

        let seed = Url::parse(seed_url)
            .map_err(|e| CrawlError::InvalidUrl(format!("{seed_url}: {e}")))?;
        let scope = SiteScope::from_url(&seed)?;
        let config = Arc::new(self.config.clone());

        let callbacks = match self.callbacks.lock() {
            Ok(set) => set.clone(),
            Err(_) => CallbackSet::default(),
        };

        let fetcher = Arc::new(Fetcher::new(&config)?);
        let filters = Arc::new(UrlFilters::from_config(&config)?);
        let store = Arc::new(VisitStore::with_pre_visited(&config.pre_visited_hashes));
        let robots = Arc::new(RobotsGate::new(
            config.robots_txt_mode,
            config.user_agent.clone(),
            fetch_fn(&fetcher),
        ));
        let hasher = config
            .enable_content_hash
            .then(|| Arc::new(ContentHasher::new(config.content_hash.clone())));

        let (channel, rx) = DiscoveryChannel::new(config.discovery_channel_capacity());
        let pool = Arc::new(WorkerPool::new(config.parallelism, config.work_queue_size));
        let (shutdown_tx, _) = broadcast::channel(1);

        let engine = Arc::new(Engine {
            budget: Budget::new(config.max_urls_to_visit),
            tracker: Arc::new(WorkTracker::new()),
            pending: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            started_at: Instant::now(),
            config: Arc::clone(&config),
            callbacks,
            fetcher,
            store,
            robots,
            filters,
            scope,
            hasher,
            channel,
            pool,
            shutdown_tx,
        });
        self.engine
            .set(Arc::clone(&engine))
            .map_err(|_| CrawlError::Config("engine already initialized".into()))?;

        let processor = tokio::spawn(run_processor(Arc::clone(&engine), rx));
        if let Ok(mut slot) = self.processor.lock() {
            *slot = Some(processor);
        }

        // Resume seeds first, then the initial URL.
        for pending in &config.seed_urls {
            engine.queue_url(pending.clone());
        }
        engine.queue_url(DiscoveredUrl::seed(seed.as_str()));

        if config.sitemap_enabled() {
            spawn_sitemap_loader(Arc::clone(&engine), seed.clone());
        }

        info!(seed = %seed, root = %scope_host(&engine), "crawl started");
        Ok(())
    }

    /// Block until the outstanding-work counter reaches zero, then tear
    /// down in order: close the channel, join the Processor, close the
    /// pool, snapshot pending URLs, fire the completion callback.
    pub async fn wait(&self) -> Result<CrawlSummary, CrawlError> {
        if self.state.load(Ordering::SeqCst) != STATE_RUNNING {
            return Err(CrawlError::Config("wait requires a started crawl".into()));
        }
        let engine = self
            .engine
            .get()
            .ok_or_else(|| CrawlError::Config("wait requires a started crawl".into()))?;

        engine.tracker.wait_zero().await;

        engine.channel.close();
        let processor = match self.processor.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = processor {
            let _ = handle.await;
        }
        engine.pool.close().await;

        let pending_urls: Vec<DiscoveredUrl> = match engine.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        let reason = if engine.is_cancelled() {
            CompletionReason::Cancelled
        } else if engine.budget.reached.load(Ordering::SeqCst) {
            CompletionReason::BudgetReached
        } else {
            CompletionReason::Exhausted
        };

        self.state.store(STATE_TERMINAL, Ordering::SeqCst);

        let summary = CrawlSummary {
            reason,
            urls_visited: engine.budget.visited.load(Ordering::SeqCst),
            urls_dropped: engine.channel.dropped(),
            pending_urls,
            urls_discovered: engine.store.count_actions(),
            duration_ms: engine.started_at.elapsed().as_millis() as u64,
        };
        info!(
            reason = ?summary.reason,
            visited = summary.urls_visited,
            pending = summary.pending_urls.len(),
            "crawl finished"
        );

        if let Some(cb) = &engine.callbacks.on_crawl_complete {
            cb(summary.clone());
        }
        Ok(summary)
    }

    /// Cancel the crawl. Every blocking point observes this: in-flight
    /// fetches abort, the Processor drains and settles buffered requests,
    /// and `wait` reports `Cancelled`.
    pub fn stop(&self) {
        if let Some(engine) = self.engine.get() {
            engine.cancelled.store(true, Ordering::SeqCst);
            let _ = engine.shutdown_tx.send(());
            debug!("stop requested");
        }
    }

    /// Count of outstanding work units; zero once the crawl has drained.
    pub fn outstanding_work(&self) -> usize {
        self.engine
            .get()
            .map(|e| e.tracker.outstanding())
            .unwrap_or(0)
    }
}

fn scope_host(engine: &Arc<Engine>) -> String {
    engine.scope.host().to_string()
}

fn spawn_sitemap_loader(engine: Arc<Engine>, seed: Url) {
    // The loader holds a work unit so the crawl can't complete while
    // sitemap URLs are still being collected.
    engine.tracker.add();
    tokio::spawn(async move {
        let _guard = WorkGuard::new(Arc::clone(&engine.tracker));
        let reader = SitemapReader::new(fetch_fn(&engine.fetcher));
        let urls = reader.discover(&seed, &engine.config.sitemap_urls).await;
        info!(count = urls.len(), "sitemap URLs queued");
        for url in urls {
            engine.queue_url(DiscoveredUrl::child(
                url,
                DiscoverySource::Sitemap,
                seed.as_str(),
                0,
            ));
        }
    });
}

/// Restore a prior session's snapshot into a config before constructing the
/// crawler. Correctness of the resume follows from the visited-set seam: a
/// hash in the snapshot is never fetched again.
pub async fn preload_from_queue(
    config: &mut CrawlConfig,
    queue: &dyn PersistentQueue,
) -> Result<(), CrawlError> {
    config.pre_visited_hashes = queue.load_visited_hashes().await?;
    config.seed_urls = queue.load_pending_seed_urls().await?;
    Ok(())
}
