use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("redirect to {url} blocked: {reason}")]
    RedirectBlocked { url: String, reason: String },

    #[error("too many redirects following {0}")]
    TooManyRedirects(String),

    #[error("blocked by robots.txt: {0}")]
    RobotsBlocked(String),

    #[error("URL already visited: {0}")]
    AlreadyVisited(String),

    #[error("max request limit reached")]
    MaxRequestsReached,

    #[error("crawl cancelled")]
    Cancelled,

    #[error("work queue closed")]
    QueueClosed,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CrawlError {
    /// Whether this error should be surfaced to result callbacks.
    /// AlreadyVisited is an internal routing outcome, never an
    /// application-facing error.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, CrawlError::AlreadyVisited(_))
    }
}
