use std::sync::Mutex;

use async_trait::async_trait;

use bluesnake_core::{CrawlError, DiscoveredUrl};

/// Pause/resume substrate. The engine consumes this only at construction
/// (restoring visited hashes and pending seeds); the application calls the
/// record methods from its result callbacks.
#[async_trait]
pub trait PersistentQueue: Send + Sync {
    async fn load_visited_hashes(&self) -> Result<Vec<u64>, CrawlError>;
    async fn load_pending_seed_urls(&self) -> Result<Vec<DiscoveredUrl>, CrawlError>;
    /// Persist a terminal visit for one URL.
    async fn record_visit(&self, url: &str, url_hash: u64) -> Result<(), CrawlError>;
    /// Persist the pending snapshot of a budget-limited run. Called once,
    /// at the end of the session.
    async fn record_pending(&self, urls: &[DiscoveredUrl]) -> Result<(), CrawlError>;
    async fn clear_queue(&self) -> Result<(), CrawlError>;
}

#[derive(Default)]
struct MemoryQueueState {
    visited: Vec<(String, u64)>,
    pending: Vec<DiscoveredUrl>,
}

/// In-memory queue implementation, used by tests and the CLI resume demo.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentQueue for MemoryQueue {
    async fn load_visited_hashes(&self) -> Result<Vec<u64>, CrawlError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.visited.iter().map(|(_, h)| *h).collect())
    }

    async fn load_pending_seed_urls(&self) -> Result<Vec<DiscoveredUrl>, CrawlError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.pending.clone())
    }

    async fn record_visit(&self, url: &str, url_hash: u64) -> Result<(), CrawlError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.visited.push((url.to_string(), url_hash));
        Ok(())
    }

    async fn record_pending(&self, urls: &[DiscoveredUrl]) -> Result<(), CrawlError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.pending = urls.to_vec();
        Ok(())
    }

    async fn clear_queue(&self) -> Result<(), CrawlError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.visited.clear();
        state.pending.clear();
        Ok(())
    }
}

fn poisoned() -> CrawlError {
    CrawlError::Storage("memory queue lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use bluesnake_core::DiscoverySource;

    use super::*;

    #[tokio::test]
    async fn memory_queue_round_trips() {
        let queue = MemoryQueue::new();
        queue.record_visit("https://example.com/", 11).await.unwrap();
        queue.record_visit("https://example.com/a", 22).await.unwrap();
        queue
            .record_pending(&[DiscoveredUrl {
                url: "https://example.com/b".into(),
                source: DiscoverySource::Spider,
                parent_url: Some("https://example.com/".into()),
                depth: 1,
            }])
            .await
            .unwrap();

        assert_eq!(queue.load_visited_hashes().await.unwrap(), vec![11, 22]);
        let pending = queue.load_pending_seed_urls().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://example.com/b");

        queue.clear_queue().await.unwrap();
        assert!(queue.load_visited_hashes().await.unwrap().is_empty());
        assert!(queue.load_pending_seed_urls().await.unwrap().is_empty());
    }
}
