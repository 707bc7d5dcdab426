mod channel;
mod crawler;
mod engine;
mod filters;
mod pool;
mod processor;
mod tracker;
mod worker;

pub use channel::DiscoveryChannel;
pub use crawler::{preload_from_queue, Crawler};
pub use filters::UrlFilters;
pub use pool::{Task, WorkerPool};
pub use tracker::{WorkGuard, WorkTracker};

pub use bluesnake_core::{
    CompletionReason, ContentHashAlgorithm, ContentHashConfig, CrawlConfig, CrawlError,
    CrawlSummary, DiscoveredUrl, DiscoveryMechanism, DiscoverySource, Link, LinkInventory,
    LinkPosition, LinkType, PageResult, PathType, ResourceResult, RobotsTxtMode, UrlAction,
};
pub use bluesnake_frontier::{url_hash, MemoryQueue, PersistentQueue, VisitStore};
