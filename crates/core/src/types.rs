use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which code path produced a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// The seed URL passed to `start`.
    Initial,
    /// Found in a sitemap.
    Sitemap,
    /// Followed from an HTML link on a crawled page.
    Spider,
    /// In-page network reference (CSS `url(...)` and similar).
    Network,
    /// Sub-resource of a page (images, scripts, stylesheets, resource hints).
    Resource,
}

/// A request to visit a URL. Immutable once queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    pub source: DiscoverySource,
    pub parent_url: Option<String>,
    pub depth: u32,
}

impl DiscoveredUrl {
    pub fn seed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: DiscoverySource::Initial,
            parent_url: None,
            depth: 0,
        }
    }

    pub fn child(
        url: impl Into<String>,
        source: DiscoverySource,
        parent: &str,
        parent_depth: u32,
    ) -> Self {
        Self {
            url: url.into(),
            source,
            parent_url: Some(parent.to_string()),
            depth: parent_depth + 1,
        }
    }
}

/// Per-URL routing decision, assigned once per unique URL and memoized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlAction {
    /// Filter, then fetch.
    Crawl,
    /// Keep in the link inventory but never fetch.
    RecordOnly,
    /// Drop entirely.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Anchor,
    Image,
    Script,
    Stylesheet,
    Font,
    Iframe,
    Canonical,
    Video,
    Audio,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPosition {
    Content,
    Navigation,
    Header,
    Footer,
    Sidebar,
    Breadcrumbs,
    Pagination,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    /// `http(s)://...` or protocol-relative `//...`
    Absolute,
    /// Starts with `/`
    RootRelative,
    Relative,
}

/// A reference discovered on a page, resolved to an absolute URL.
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub url: String,
    pub link_type: LinkType,
    pub anchor_text: Option<String>,
    pub rel: Option<String>,
    pub target: Option<String>,
    pub path_type: PathType,
    pub is_internal: bool,
    /// False when rel carries nofollow/sponsored/ugc.
    pub follow: bool,
    pub position: LinkPosition,
    pub dom_path: String,
    /// Enrichment from the visit store: what we last saw at this URL.
    pub last_seen_status: Option<u16>,
    pub last_seen_title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkInventory {
    pub internal: Vec<Link>,
    pub external: Vec<Link>,
}

impl LinkInventory {
    pub fn len(&self) -> usize {
        self.internal.len() + self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.internal.iter().chain(self.external.iter())
    }
}

/// One captured hop of a manually-followed redirect chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
}

/// What the fetcher returns for a single request.
#[derive(Debug, Clone)]
pub struct Response {
    /// The URL that was requested.
    pub url: String,
    /// Where the request ended up after redirects.
    pub final_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub redirect_chain: Vec<RedirectHop>,
    /// Body was cut off at the configured size cap.
    pub truncated: bool,
    pub from_cache: bool,
    pub fetched_at: DateTime<Utc>,
    pub response_time_ms: u64,
}

impl Response {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml+xml"))
            .unwrap_or(false)
    }

    pub fn is_css(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/css"))
            .unwrap_or(false)
    }
}

/// Emission payload for an HTML response (and for redirect hops whose final
/// destination is HTML).
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub depth: u32,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub h2: Option<String>,
    pub canonical: Option<String>,
    pub word_count: usize,
    pub indexable: bool,
    pub links: LinkInventory,
    pub content_hash: Option<String>,
    pub is_duplicate_content: bool,
    pub redirect_chain: Vec<RedirectHop>,
    pub content_type: Option<String>,
    pub error: Option<String>,
    /// Raw response body, kept for deferred text extraction by the caller.
    #[serde(skip)]
    pub body: Arc<Vec<u8>>,
}

/// Emission payload for a non-HTML response.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceResult {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub error: Option<String>,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Discovery drained with no budget or cancellation in play.
    Exhausted,
    /// The incremental visit budget was consumed.
    BudgetReached,
    /// `stop` was called before the frontier drained.
    Cancelled,
}

/// Handed to the completion callback and returned from `wait`.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub reason: CompletionReason,
    pub urls_visited: u64,
    pub urls_dropped: u64,
    /// URLs that passed filters but were never visited (budget runs);
    /// feed these back as seed URLs to resume.
    pub pending_urls: Vec<DiscoveredUrl>,
    /// Distinct URLs routed through the discovery callback.
    pub urls_discovered: usize,
    pub duration_ms: u64,
}

/// Last-seen facts about a URL, cached for link enrichment.
#[derive(Debug, Clone)]
pub struct UrlMetadata {
    pub status: u16,
    pub title: Option<String>,
    pub content_type: Option<String>,
}
