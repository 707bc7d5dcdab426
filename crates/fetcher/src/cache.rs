use std::collections::HashMap;
use std::hash::Hasher;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bluesnake_core::{CrawlError, Response};

/// On-disk response cache keyed by (method, URL, body). Entries expire after
/// the configured TTL; a zero TTL keeps them forever.
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    final_url: String,
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    truncated: bool,
    stored_at: DateTime<Utc>,
}

pub fn cache_key(method: &str, url: &str, body: Option<&[u8]>) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(method.as_bytes());
    hasher.write(b"\0");
    hasher.write(url.as_bytes());
    hasher.write(b"\0");
    if let Some(body) = body {
        hasher.write(body);
    }
    hasher.finish()
}

impl ResponseCache {
    pub fn new(dir: PathBuf, ttl: Duration) -> Result<Self, CrawlError> {
        std::fs::create_dir_all(&dir)
            .map_err(|e| CrawlError::Cache(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir, ttl })
    }

    fn entry_path(&self, key: u64) -> PathBuf {
        self.dir.join(format!("{key:016x}.json"))
    }

    pub async fn get(&self, key: u64) -> Option<Response> {
        let path = self.entry_path(key);
        let raw = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %path.display(), "discarding unreadable cache entry: {e}");
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };
        if !self.ttl.is_zero() {
            let age = Utc::now().signed_duration_since(entry.stored_at);
            if age.num_seconds() < 0 || age.num_seconds() as u64 > self.ttl.as_secs() {
                debug!(url = %entry.url, "cache entry expired");
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        }
        Some(Response {
            url: entry.url,
            final_url: entry.final_url,
            status: entry.status,
            headers: entry.headers,
            body: entry.body,
            redirect_chain: Vec::new(),
            truncated: entry.truncated,
            from_cache: true,
            fetched_at: entry.stored_at,
            response_time_ms: 0,
        })
    }

    pub async fn put(&self, key: u64, resp: &Response) {
        let entry = CacheEntry {
            url: resp.url.clone(),
            final_url: resp.final_url.clone(),
            status: resp.status,
            headers: resp.headers.clone(),
            body: resp.body.clone(),
            truncated: resp.truncated,
            stored_at: resp.fetched_at,
        };
        let path = self.entry_path(key);
        match serde_json::to_vec(&entry) {
            Ok(raw) => {
                if let Err(e) = tokio::fs::write(&path, raw).await {
                    warn!(path = %path.display(), "cache write failed: {e}");
                }
            }
            Err(e) => warn!(url = %resp.url, "cache serialize failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response(url: &str) -> Response {
        Response {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            headers: HashMap::from([("content-type".to_string(), "text/html".to_string())]),
            body: b"<html></html>".to_vec(),
            redirect_chain: Vec::new(),
            truncated: false,
            from_cache: false,
            fetched_at: Utc::now(),
            response_time_ms: 12,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), Duration::from_secs(60)).unwrap();
        let key = cache_key("GET", "https://example.com/", None);
        assert!(cache.get(key).await.is_none());

        cache.put(key, &sample_response("https://example.com/")).await;
        let hit = cache.get(key).await.unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, b"<html></html>");
    }

    #[tokio::test]
    async fn expired_entries_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), Duration::from_secs(10)).unwrap();
        let key = cache_key("GET", "https://example.com/old", None);
        let mut resp = sample_response("https://example.com/old");
        resp.fetched_at = Utc::now() - chrono::Duration::seconds(3600);
        cache.put(key, &resp).await;
        assert!(cache.get(key).await.is_none());
    }

    #[test]
    fn key_varies_by_method_url_and_body() {
        let a = cache_key("GET", "https://example.com/", None);
        let b = cache_key("POST", "https://example.com/", None);
        let c = cache_key("POST", "https://example.com/", Some(b"x=1"));
        assert_ne!(a, b);
        assert_ne!(b, c);
    }
}
