pub mod config;
pub mod error;
pub mod types;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use config::{
    ContentHashAlgorithm, ContentHashConfig, CrawlConfig, DiscoveryMechanism, RobotsTxtMode,
    DEFAULT_USER_AGENT,
};
pub use error::CrawlError;
pub use types::{
    CompletionReason, CrawlSummary, DiscoveredUrl, DiscoverySource, Link, LinkInventory,
    LinkPosition, LinkType, PageResult, PathType, RedirectHop, ResourceResult, Response,
    UrlAction, UrlMetadata,
};

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Response, CrawlError>> + Send>>;

/// An injected fetch function. The robots gate and the sitemap reader take
/// one of these at construction instead of reaching for a shared client, so
/// tests can swap the transport.
pub type FetchFn = Arc<dyn Fn(String) -> FetchFuture + Send + Sync>;
