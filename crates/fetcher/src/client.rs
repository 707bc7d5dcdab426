use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::{debug, warn};
use url::Url;

use bluesnake_core::{CrawlConfig, CrawlError, FetchFn, RedirectHop, Response};

use crate::cache::{cache_key, ResponseCache};
use crate::charset::{canonicalize_utf8, is_text_media};

/// Upper bound on manually-followed redirect hops per request.
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Invoked before each redirect hop is followed. Returning an error blocks
/// the hop; the error surfaces on the original request.
pub type RedirectHook =
    Arc<dyn Fn(&Url, &[RedirectHop]) -> Result<(), CrawlError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Vec<u8>>,
    /// Header overrides; Accept defaults to `*/*` when absent.
    pub headers: Vec<(String, String)>,
    pub depth: u32,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
            headers: Vec::new(),
            depth: 0,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// HTTP client wrapper. The underlying client never follows redirects on its
/// own; the fetch loop captures each hop and consults the redirect hook.
pub struct Fetcher {
    client: reqwest::Client,
    requests_made: AtomicU64,
    max_requests: u64,
    max_body_size: usize,
    detect_charset: bool,
    cache: Option<ResponseCache>,
}

impl Fetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CrawlError::Config(format!("http client: {e}")))?;

        let cache = match &config.cache_dir {
            Some(dir) => Some(ResponseCache::new(
                dir.clone(),
                Duration::from_secs(config.cache_expiration_seconds),
            )?),
            None => None,
        };

        Ok(Self {
            client,
            requests_made: AtomicU64::new(0),
            max_requests: config.max_requests,
            max_body_size: config.max_body_size,
            detect_charset: config.detect_charset,
            cache,
        })
    }

    pub fn requests_made(&self) -> u64 {
        self.requests_made.load(Ordering::SeqCst)
    }

    fn count_request(&self) -> Result<(), CrawlError> {
        let prev = self.requests_made.fetch_add(1, Ordering::SeqCst);
        if self.max_requests > 0 && prev >= self.max_requests {
            return Err(CrawlError::MaxRequestsReached);
        }
        Ok(())
    }

    /// Issue one request, following redirects manually. Each hop is recorded
    /// in the returned chain and offered to `hook` before it is followed.
    pub async fn fetch(
        &self,
        req: FetchRequest,
        hook: Option<RedirectHook>,
    ) -> Result<Response, CrawlError> {
        let start = Instant::now();

        let key = cache_key(req.method.as_str(), &req.url, req.body.as_deref());
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(key).await {
                debug!(url = %req.url, "served from cache");
                return Ok(hit);
            }
        }

        let mut current =
            Url::parse(&req.url).map_err(|e| CrawlError::InvalidUrl(format!("{}: {e}", req.url)))?;
        let mut method = req.method.clone();
        let mut chain: Vec<RedirectHop> = Vec::new();
        let mut body_pending = req.body.clone();

        loop {
            self.count_request()?;

            let mut builder = self.client.request(method.clone(), current.clone());
            let mut has_accept = false;
            for (name, value) in &req.headers {
                if name.eq_ignore_ascii_case("accept") {
                    has_accept = true;
                }
                builder = builder.header(name, value);
            }
            if !has_accept {
                builder = builder.header("Accept", "*/*");
            }
            if let Some(body) = body_pending.take() {
                builder = builder.body(body);
            }

            let resp = builder.send().await.map_err(|e| {
                warn!(url = %current, "request failed: {e}");
                CrawlError::Transport(e.to_string())
            })?;

            let status = resp.status().as_u16();
            let location = resp
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if (300..400).contains(&status) && status != 304 {
                if let Some(location) = location {
                    if chain.len() >= MAX_REDIRECT_HOPS {
                        return Err(CrawlError::TooManyRedirects(req.url.clone()));
                    }
                    let next = current.join(&location).map_err(|e| {
                        CrawlError::InvalidUrl(format!("redirect target {location}: {e}"))
                    })?;
                    chain.push(RedirectHop {
                        url: current.to_string(),
                        status,
                        headers: flatten_headers(resp.headers()),
                    });
                    if let Some(hook) = &hook {
                        hook(&next, &chain)?;
                    }
                    if matches!(status, 301 | 302 | 303) {
                        method = Method::GET;
                    }
                    debug!(from = %current, to = %next, status, "following redirect");
                    current = next;
                    continue;
                }
                // 3xx without a Location header falls through as a terminal
                // response.
            }

            let headers = flatten_headers(resp.headers());
            let (mut body, truncated) = self.read_body(resp).await?;
            let content_type = headers.get("content-type").map(|s| s.as_str());
            if self.detect_charset && is_text_media(content_type) {
                body = canonicalize_utf8(body, content_type);
            }

            let out = Response {
                url: req.url.clone(),
                final_url: current.to_string(),
                status,
                headers,
                body,
                redirect_chain: chain,
                truncated,
                from_cache: false,
                fetched_at: Utc::now(),
                response_time_ms: start.elapsed().as_millis() as u64,
            };

            if let Some(cache) = &self.cache {
                if method == Method::GET && out.status == 200 {
                    cache.put(key, &out).await;
                }
            }
            return Ok(out);
        }
    }

    async fn read_body(&self, mut resp: reqwest::Response) -> Result<(Vec<u8>, bool), CrawlError> {
        let mut out: Vec<u8> = Vec::new();
        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    if self.max_body_size > 0 && out.len() + chunk.len() > self.max_body_size {
                        let take = self.max_body_size - out.len();
                        out.extend_from_slice(&chunk[..take]);
                        return Ok((out, true));
                    }
                    out.extend_from_slice(&chunk);
                }
                Ok(None) => return Ok((out, false)),
                Err(e) => return Err(CrawlError::Transport(e.to_string())),
            }
        }
    }
}

/// Plain GET closure over this fetcher, with redirects followed freely.
/// Handed to collaborators (robots gate, sitemap reader) so they share the
/// transport without holding the fetcher type.
pub fn fetch_fn(fetcher: &Arc<Fetcher>) -> FetchFn {
    let fetcher = Arc::clone(fetcher);
    Arc::new(move |url: String| {
        let fetcher = Arc::clone(&fetcher);
        Box::pin(async move { fetcher.fetch(FetchRequest::get(url), None).await })
    })
}

fn flatten_headers(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    out
}
