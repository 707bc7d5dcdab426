use std::num::NonZeroUsize;
use std::sync::Mutex;

use dashmap::{DashMap, DashSet};
use lru::LruCache;

use bluesnake_core::{UrlAction, UrlMetadata};

const METADATA_CACHE_SIZE: usize = 16_384;

/// Atomic visited-hash set, per-URL action memo, and a small metadata cache
/// for link enrichment. Lives for one crawl session; may be pre-seeded from a
/// persistent queue snapshot to resume.
pub struct VisitStore {
    visited: DashSet<u64>,
    actions: DashMap<String, UrlAction>,
    metadata: Mutex<LruCache<String, UrlMetadata>>,
}

impl Default for VisitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitStore {
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(METADATA_CACHE_SIZE).expect("nonzero cache size");
        Self {
            visited: DashSet::new(),
            actions: DashMap::new(),
            metadata: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Restore a prior session's visited set.
    pub fn with_pre_visited(hashes: &[u64]) -> Self {
        let store = Self::new();
        for h in hashes {
            store.visited.insert(*h);
        }
        store
    }

    /// Linearizable test-and-set. Returns true exactly once per hash: the
    /// first caller wins, every later call returns false.
    pub fn visit_if_not_visited(&self, hash: u64) -> bool {
        self.visited.insert(hash)
    }

    /// Unconditional insert, used to restore resume state and to claim
    /// redirect destinations.
    pub fn pre_mark_visited(&self, hash: u64) {
        self.visited.insert(hash);
    }

    /// Rollback seam for the visit budget: a URL that was claimed but will
    /// stay pending must become claimable again.
    pub fn unmark_visited(&self, hash: u64) {
        self.visited.remove(&hash);
    }

    pub fn is_visited(&self, hash: u64) -> bool {
        self.visited.contains(&hash)
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    /// Memoized per-URL action: `produce` runs for the first caller only,
    /// all later lookups for the same URL string get the cached value.
    pub fn get_or_put_action<F>(&self, url: &str, produce: F) -> UrlAction
    where
        F: FnOnce(&str) -> UrlAction,
    {
        *self
            .actions
            .entry(url.to_string())
            .or_insert_with(|| produce(url))
            .value()
    }

    /// Number of distinct URLs routed through the action memo.
    pub fn count_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn store_metadata(&self, url: &str, meta: UrlMetadata) {
        if let Ok(mut cache) = self.metadata.lock() {
            cache.put(url.to_string(), meta);
        }
    }

    pub fn metadata(&self, url: &str) -> Option<UrlMetadata> {
        self.metadata.lock().ok()?.get(url).cloned()
    }
}
