use std::sync::Arc;

use dashmap::DashMap;
use texting_robots::Robot;
use tracing::{debug, warn};
use url::Url;

use bluesnake_core::{CrawlError, FetchFn, RobotsTxtMode};

/// Per-host robots.txt gate. The ruleset for a host is fetched once through
/// the injected fetch function (redirects followed, unlike content fetches)
/// and cached for the life of the crawl. A missing or errored robots.txt
/// allows everything.
pub struct RobotsGate {
    mode: RobotsTxtMode,
    user_agent: String,
    fetch: FetchFn,
    /// host:port -> compiled ruleset; None = allow all
    cache: DashMap<String, Arc<Option<Robot>>>,
}

impl RobotsGate {
    pub fn new(mode: RobotsTxtMode, user_agent: impl Into<String>, fetch: FetchFn) -> Self {
        Self {
            mode,
            user_agent: user_agent.into(),
            fetch,
            cache: DashMap::new(),
        }
    }

    pub fn mode(&self) -> RobotsTxtMode {
        self.mode
    }

    /// Allow/deny verdict for one URL under the configured mode. In
    /// `ignore` mode nothing is fetched and everything passes; in
    /// `ignore-report` mode denials are logged and then allowed.
    pub async fn allowed(&self, url: &Url) -> Result<bool, CrawlError> {
        if self.mode == RobotsTxtMode::Ignore {
            return Ok(true);
        }

        let ruleset = self.ruleset_for(url).await;
        let verdict = match ruleset.as_ref() {
            Some(robot) => robot.allowed(url.as_str()),
            None => true,
        };

        if verdict {
            return Ok(true);
        }
        match self.mode {
            RobotsTxtMode::Respect => Ok(false),
            RobotsTxtMode::IgnoreReport => {
                warn!(url = %url, "robots.txt would deny this URL, crawling anyway");
                Ok(true)
            }
            RobotsTxtMode::Ignore => Ok(true),
        }
    }

    async fn ruleset_for(&self, url: &Url) -> Arc<Option<Robot>> {
        let key = host_key(url);
        if let Some(cached) = self.cache.get(&key) {
            return Arc::clone(&cached);
        }

        let robots_url = match robots_url_for(url) {
            Some(u) => u,
            None => {
                let allow_all = Arc::new(None);
                self.cache.insert(key, Arc::clone(&allow_all));
                return allow_all;
            }
        };

        let ruleset = match (self.fetch)(robots_url.clone()).await {
            Ok(resp) if (200..300).contains(&resp.status) => {
                match Robot::new(&self.user_agent, &resp.body) {
                    Ok(robot) => {
                        debug!(url = %robots_url, "robots.txt loaded");
                        Some(robot)
                    }
                    Err(e) => {
                        warn!(url = %robots_url, "unparseable robots.txt, allowing all: {e}");
                        None
                    }
                }
            }
            Ok(resp) => {
                if resp.status >= 500 {
                    warn!(url = %robots_url, status = resp.status, "robots.txt server error, allowing all");
                } else {
                    debug!(url = %robots_url, status = resp.status, "no robots.txt, allowing all");
                }
                None
            }
            Err(e) => {
                warn!(url = %robots_url, "robots.txt fetch failed, allowing all: {e}");
                None
            }
        };

        let ruleset = Arc::new(ruleset);
        self.cache.insert(key, Arc::clone(&ruleset));
        ruleset
    }

    /// Number of hosts with a cached ruleset.
    pub fn cached_hosts(&self) -> usize {
        self.cache.len()
    }
}

fn host_key(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or(""),
        url.port_or_known_default().unwrap_or(0)
    )
}

fn robots_url_for(url: &Url) -> Option<String> {
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    url.host_str()?;
    Some(robots.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bluesnake_core::Response;

    use super::*;

    fn fake_fetch(status: u16, body: &str, calls: Arc<AtomicUsize>) -> FetchFn {
        let body = body.as_bytes().to_vec();
        Arc::new(move |url: String| {
            calls.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            Box::pin(async move {
                Ok(Response {
                    url: url.clone(),
                    final_url: url,
                    status,
                    headers: HashMap::new(),
                    body,
                    redirect_chain: Vec::new(),
                    truncated: false,
                    from_cache: false,
                    fetched_at: chrono::Utc::now(),
                    response_time_ms: 1,
                })
            })
        })
    }

    const ROBOTS: &str = "User-agent: *\nDisallow: /private/\n";

    #[tokio::test]
    async fn respect_mode_denies_disallowed_paths() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = RobotsGate::new(
            RobotsTxtMode::Respect,
            "bluesnake/1.0",
            fake_fetch(200, ROBOTS, Arc::clone(&calls)),
        );
        let blocked = Url::parse("https://example.com/private/page").unwrap();
        let open = Url::parse("https://example.com/public").unwrap();
        assert!(!gate.allowed(&blocked).await.unwrap());
        assert!(gate.allowed(&open).await.unwrap());
    }

    #[tokio::test]
    async fn ruleset_is_fetched_once_per_host() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = RobotsGate::new(
            RobotsTxtMode::Respect,
            "bluesnake/1.0",
            fake_fetch(200, ROBOTS, Arc::clone(&calls)),
        );
        for i in 0..5 {
            let url = Url::parse(&format!("https://example.com/p{i}")).unwrap();
            gate.allowed(&url).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.cached_hosts(), 1);
    }

    #[tokio::test]
    async fn ignore_mode_never_fetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = RobotsGate::new(
            RobotsTxtMode::Ignore,
            "bluesnake/1.0",
            fake_fetch(200, ROBOTS, Arc::clone(&calls)),
        );
        let blocked = Url::parse("https://example.com/private/x").unwrap();
        assert!(gate.allowed(&blocked).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ignore_report_mode_allows_denied_urls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = RobotsGate::new(
            RobotsTxtMode::IgnoreReport,
            "bluesnake/1.0",
            fake_fetch(200, ROBOTS, Arc::clone(&calls)),
        );
        let blocked = Url::parse("https://example.com/private/x").unwrap();
        assert!(gate.allowed(&blocked).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_robots_allows_everything() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = RobotsGate::new(
            RobotsTxtMode::Respect,
            "bluesnake/1.0",
            fake_fetch(404, "", Arc::clone(&calls)),
        );
        let url = Url::parse("https://example.com/private/x").unwrap();
        assert!(gate.allowed(&url).await.unwrap());
    }
}
