use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::broadcast;
use url::Url;

use bluesnake_core::{CrawlConfig, CrawlError, DiscoveredUrl, UrlAction};
use bluesnake_fetcher::{Fetcher, RedirectHook};
use bluesnake_frontier::{hash_normalized, VisitStore};
use bluesnake_parser::{ContentHasher, SiteScope};
use bluesnake_robots::RobotsGate;

use crate::channel::DiscoveryChannel;
use crate::filters::UrlFilters;
use crate::pool::WorkerPool;
use crate::tracker::WorkTracker;

pub type DiscoveryCallback = Arc<dyn Fn(&str) -> UrlAction + Send + Sync>;
pub type PageCallback = Arc<dyn Fn(bluesnake_core::PageResult) + Send + Sync>;
pub type ResourceCallback = Arc<dyn Fn(bluesnake_core::ResourceResult) + Send + Sync>;
pub type CompleteCallback = Arc<dyn Fn(bluesnake_core::CrawlSummary) + Send + Sync>;

#[derive(Default, Clone)]
pub struct CallbackSet {
    pub on_url_discovered: Option<DiscoveryCallback>,
    pub on_page_crawled: Option<PageCallback>,
    pub on_resource_visit: Option<ResourceCallback>,
    pub on_crawl_complete: Option<CompleteCallback>,
}

/// The incremental visit budget. `visited` also doubles as the session's
/// visit counter when no limit is set.
pub struct Budget {
    pub limit: u64,
    pub visited: AtomicU64,
    pub reached: AtomicBool,
}

impl Budget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            visited: AtomicU64::new(0),
            reached: AtomicBool::new(false),
        }
    }

    /// Count one visit. When the limit would be exceeded the increment is
    /// rolled back and the budget is flagged exhausted.
    pub fn try_acquire(&self) -> bool {
        let prev = self.visited.fetch_add(1, Ordering::SeqCst);
        if self.limit > 0 && prev >= self.limit {
            self.visited.fetch_sub(1, Ordering::SeqCst);
            self.reached.store(true, Ordering::SeqCst);
            return false;
        }
        true
    }
}

/// Everything the Processor and the worker tasks share. Owned by the
/// Crawler; lower layers receive only this, never the Crawler itself.
pub struct Engine {
    pub config: Arc<CrawlConfig>,
    pub callbacks: CallbackSet,
    pub fetcher: Arc<Fetcher>,
    pub store: Arc<VisitStore>,
    pub robots: Arc<RobotsGate>,
    pub filters: Arc<UrlFilters>,
    pub scope: SiteScope,
    pub hasher: Option<Arc<ContentHasher>>,
    pub tracker: Arc<WorkTracker>,
    pub channel: DiscoveryChannel,
    pub pool: Arc<WorkerPool>,
    pub budget: Budget,
    pub pending: Mutex<Vec<DiscoveredUrl>>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub cancelled: AtomicBool,
    pub started_at: Instant,
}

impl Engine {
    /// Entry point for every discovery producer. Never blocks.
    pub fn queue_url(&self, req: DiscoveredUrl) {
        self.channel.queue(req, &self.tracker);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The redirect hook handed to the fetcher for content requests: hop
    /// destinations undergo the same URL filters as discovered URLs, and a
    /// hop into an already-visited URL is blocked so nothing is fetched
    /// twice through a redirect seam.
    pub fn redirect_hook(self: &Arc<Self>) -> RedirectHook {
        let engine = Arc::clone(self);
        Arc::new(move |next: &Url, _via| {
            if !engine.filters.allows(next) {
                return Err(CrawlError::RedirectBlocked {
                    url: next.to_string(),
                    reason: "redirect destination failed URL filters".into(),
                });
            }
            let mut normalized = next.clone();
            normalized.set_fragment(None);
            let hash = hash_normalized(normalized.as_str());
            if !engine.store.visit_if_not_visited(hash) {
                return Err(CrawlError::AlreadyVisited(next.to_string()));
            }
            Ok(())
        })
    }
}
