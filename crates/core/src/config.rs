use std::path::PathBuf;

use serde::Deserialize;

use crate::types::DiscoveredUrl;

pub const DEFAULT_USER_AGENT: &str = "bluesnake/1.0 (+https://snake.blue)";
pub const DEFAULT_DISCOVERY_CHANNEL_SIZE: usize = 50_000;
/// Larger buffer when a visit budget is set, to minimize drop risk across
/// a long pause/resume cycle.
pub const INCREMENTAL_DISCOVERY_CHANNEL_SIZE: usize = 500_000;
pub const DEFAULT_WORK_QUEUE_SIZE: usize = 1_000;
pub const DEFAULT_PARALLELISM: usize = 10;
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RobotsTxtMode {
    /// Deny means the URL is never fetched.
    Respect,
    /// Skip fetching and checking robots.txt entirely.
    Ignore,
    /// Check and log would-denies, but crawl anyway.
    IgnoreReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMechanism {
    /// Follow links found on crawled pages.
    Spider,
    /// Load URL lists from sitemap.xml.
    Sitemap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentHashAlgorithm {
    Xxhash,
    Md5,
    Sha256,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentHashConfig {
    pub algorithm: ContentHashAlgorithm,
    /// Subtrees removed before hashing.
    pub exclude_tags: Vec<String>,
    /// When non-empty, only these subtrees are hashed.
    pub include_only_tags: Vec<String>,
    /// Blank out common timestamp formats before hashing.
    pub strip_timestamps: bool,
    pub strip_comments: bool,
    pub collapse_whitespace: bool,
}

impl Default for ContentHashConfig {
    fn default() -> Self {
        Self {
            algorithm: ContentHashAlgorithm::Xxhash,
            exclude_tags: ["script", "style", "nav", "footer"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            include_only_tags: Vec::new(),
            strip_timestamps: false,
            strip_comments: true,
            collapse_whitespace: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Drop URLs whose depth exceeds this. 0 = unlimited.
    pub max_depth: u32,
    /// Host allowlist. Empty = allow all. Subdomains of an entry match.
    pub allowed_domains: Vec<String>,
    /// Host blocklist. Subdomains of an entry match.
    pub disallowed_domains: Vec<String>,
    /// Regex allowlist over the full URL. Empty = allow all.
    pub url_filters: Vec<String>,
    /// Regex blocklist over the full URL.
    pub disallowed_url_filters: Vec<String>,
    pub discovery_mechanisms: Vec<DiscoveryMechanism>,
    /// Explicit sitemap URLs. Empty = probe /sitemap.xml and /sitemap_index.xml.
    pub sitemap_urls: Vec<String>,
    pub robots_txt_mode: RobotsTxtMode,
    /// Crawl same-domain links even when rel says nofollow.
    pub follow_internal_nofollow: bool,
    /// Crawl cross-domain links even when rel says nofollow.
    pub follow_external_nofollow: bool,
    pub respect_meta_robots_noindex: bool,
    pub discovery_channel_size: usize,
    pub work_queue_size: usize,
    pub parallelism: usize,
    /// Incremental budget. 0 = unlimited.
    pub max_urls_to_visit: u64,
    /// Hard ceiling on outgoing requests across the whole session. 0 = unlimited.
    pub max_requests: u64,
    /// Resume: pending URLs from a prior session, queued before the seed.
    pub seed_urls: Vec<DiscoveredUrl>,
    /// Resume: visited-set snapshot restored into the visit store.
    pub pre_visited_hashes: Vec<u64>,
    /// Response body cap in bytes. 0 = unlimited.
    pub max_body_size: usize,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    /// Sniff charset and canonicalize text bodies to UTF-8.
    pub detect_charset: bool,
    /// Parse bodies of responses with status >= 203 instead of
    /// short-circuiting with an error field.
    pub parse_http_error_responses: bool,
    pub cache_dir: Option<PathBuf>,
    pub cache_expiration_seconds: u64,
    pub enable_content_hash: bool,
    pub content_hash: ContentHashConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 0,
            allowed_domains: Vec::new(),
            disallowed_domains: Vec::new(),
            url_filters: Vec::new(),
            disallowed_url_filters: Vec::new(),
            discovery_mechanisms: vec![DiscoveryMechanism::Spider],
            sitemap_urls: Vec::new(),
            robots_txt_mode: RobotsTxtMode::Respect,
            follow_internal_nofollow: false,
            follow_external_nofollow: false,
            respect_meta_robots_noindex: true,
            discovery_channel_size: DEFAULT_DISCOVERY_CHANNEL_SIZE,
            work_queue_size: DEFAULT_WORK_QUEUE_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            max_urls_to_visit: 0,
            max_requests: 0,
            seed_urls: Vec::new(),
            pre_visited_hashes: Vec::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_seconds: 30,
            detect_charset: true,
            parse_http_error_responses: false,
            cache_dir: None,
            cache_expiration_seconds: 0,
            enable_content_hash: false,
            content_hash: ContentHashConfig::default(),
        }
    }
}

impl CrawlConfig {
    /// Effective discovery channel capacity: the incremental default kicks in
    /// when a budget is set and the caller left the size untouched.
    pub fn discovery_channel_capacity(&self) -> usize {
        if self.max_urls_to_visit > 0
            && self.discovery_channel_size == DEFAULT_DISCOVERY_CHANNEL_SIZE
        {
            INCREMENTAL_DISCOVERY_CHANNEL_SIZE
        } else {
            self.discovery_channel_size
        }
    }

    pub fn spider_enabled(&self) -> bool {
        self.discovery_mechanisms
            .contains(&DiscoveryMechanism::Spider)
    }

    pub fn sitemap_enabled(&self) -> bool {
        self.discovery_mechanisms
            .contains(&DiscoveryMechanism::Sitemap)
    }
}
