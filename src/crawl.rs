use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bluesnake_core::{CrawlConfig, CrawlError, DiscoveredUrl, DiscoveryMechanism};
use bluesnake_crawler::{preload_from_queue, url_hash, Crawler, PersistentQueue};

/// Snapshot persisted between budget-limited runs: which URL hashes were
/// visited and which discovered URLs are still pending.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CrawlState {
    visited: Vec<(String, u64)>,
    pending: Vec<DiscoveredUrl>,
}

/// File-backed PersistentQueue for the CLI's pause/resume flow.
struct JsonStateFile {
    path: PathBuf,
    state: Mutex<CrawlState>,
}

impl JsonStateFile {
    fn load(path: PathBuf) -> Result<Self> {
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("unreadable state file {}", path.display()))?,
            Err(_) => CrawlState::default(),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn save(&self) -> Result<()> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("state lock poisoned"))?;
        let raw = serde_json::to_string_pretty(&*state)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("writing state file {}", self.path.display()))
    }
}

#[async_trait]
impl PersistentQueue for JsonStateFile {
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
    CrawlError::Storage("state lock poisoned".into())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_crawl(
    mut config: CrawlConfig,
    seed: String,
    depth: Option<u32>,
    parallelism: Option<usize>,
    max_urls: Option<u64>,
    sitemap: bool,
    no_spider: bool,
    state_path: Option<String>,
) -> Result<()> {
    if let Some(depth) = depth {
        config.max_depth = depth;
    }
    if let Some(parallelism) = parallelism {
        config.parallelism = parallelism;
    }
    if let Some(max_urls) = max_urls {
        config.max_urls_to_visit = max_urls;
    }
    if sitemap && !config.discovery_mechanisms.contains(&DiscoveryMechanism::Sitemap) {
        config.discovery_mechanisms.push(DiscoveryMechanism::Sitemap);
    }
    if no_spider {
        config
            .discovery_mechanisms
            .retain(|m| *m != DiscoveryMechanism::Spider);
    }

    let state = match state_path {
        Some(path) => {
            let queue = Arc::new(JsonStateFile::load(PathBuf::from(path))?);
            preload_from_queue(&mut config, queue.as_ref()).await?;
            info!(
                visited = config.pre_visited_hashes.len(),
                pending = config.seed_urls.len(),
                "resuming from state file"
            );
            Some(queue)
        }
        None => None,
    };

    let crawler = Arc::new(Crawler::new(config));

    let record = state.clone();
    crawler.on_page_crawled(move |page| {
        match serde_json::to_string(&page) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(url = %page.url, "serialize failed: {e}"),
        }
        if let (Some(queue), Ok(hash)) = (&record, url_hash(&page.url)) {
            if let Ok(mut s) = queue.state.lock() {
                s.visited.push((page.url.clone(), hash));
            }
        }
    })?;

    let record = state.clone();
    crawler.on_resource_visit(move |resource| {
        match serde_json::to_string(&resource) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(url = %resource.url, "serialize failed: {e}"),
        }
        if let (Some(queue), Ok(hash)) = (&record, url_hash(&resource.url)) {
            if let Ok(mut s) = queue.state.lock() {
                s.visited.push((resource.url.clone(), hash));
            }
        }
    })?;

    crawler.start(&seed)?;

    // Ctrl+C cancels; wait() then drains and reports Cancelled.
    {
        let crawler = Arc::clone(&crawler);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping crawl");
                crawler.stop();
            }
        });
    }

    let summary = crawler.wait().await?;
    eprintln!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(queue) = state {
        queue.record_pending(&summary.pending_urls).await?;
        queue.save()?;
        info!(pending = summary.pending_urls.len(), "state file updated");
    }
    Ok(())
}
