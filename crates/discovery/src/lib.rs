use std::collections::HashSet;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::{debug, warn};
use url::Url;

use bluesnake_core::FetchFn;

/// How deep a sitemap-index chain may nest.
const MAX_SITEMAP_DEPTH: usize = 8;

/// Default probe paths when no explicit sitemap URLs are configured.
const SITEMAP_PROBES: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];

/// Fetches sitemap.xml / sitemap_index.xml trees and returns the page URLs
/// they list. All I/O goes through the injected fetch function; partial
/// failures are logged and skipped, never fatal.
pub struct SitemapReader {
    fetch: FetchFn,
}

/// What one sitemap document contains.
#[derive(Debug, Default, PartialEq)]
struct SitemapDoc {
    child_sitemaps: Vec<String>,
    urls: Vec<String>,
}

impl SitemapReader {
    pub fn new(fetch: FetchFn) -> Self {
        Self { fetch }
    }

    /// Collect page URLs for a site. Explicit sitemap URLs win; otherwise
    /// the standard locations are probed.
    pub async fn discover(&self, base: &Url, explicit: &[String]) -> Vec<String> {
        let roots: Vec<String> = if explicit.is_empty() {
            SITEMAP_PROBES
                .iter()
                .filter_map(|path| base.join(path).ok())
                .map(|u| u.to_string())
                .collect()
        } else {
            explicit.to_vec()
        };

        let mut urls = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            self.read_recursive(root, 0, &mut urls, &mut seen).await;
        }
        debug!(count = urls.len(), "sitemap discovery finished");
        urls
    }

    async fn read_recursive(
        &self,
        sitemap_url: String,
        depth: usize,
        out: &mut Vec<String>,
        seen: &mut HashSet<String>,
    ) {
        if depth > MAX_SITEMAP_DEPTH || !seen.insert(sitemap_url.clone()) {
            return;
        }

        let resp = match (self.fetch)(sitemap_url.clone()).await {
            Ok(resp) if (200..300).contains(&resp.status) => resp,
            Ok(resp) => {
                debug!(url = %sitemap_url, status = resp.status, "sitemap not available");
                return;
            }
            Err(e) => {
                warn!(url = %sitemap_url, "sitemap fetch failed: {e}");
                return;
            }
        };

        let doc = parse_sitemap(&resp.body);
        debug!(
            url = %sitemap_url,
            urls = doc.urls.len(),
            children = doc.child_sitemaps.len(),
            "sitemap parsed"
        );
        out.extend(doc.urls);
        for child in doc.child_sitemaps {
            Box::pin(self.read_recursive(child, depth + 1, out, seen)).await;
        }
    }
}

/// Event-driven parse of one sitemap document. A `<loc>` inside `<sitemap>`
/// is a child sitemap; inside `<url>` it is a page. Anything malformed is
/// skipped and parsing continues to the end of what is readable.
fn parse_sitemap(body: &[u8]) -> SitemapDoc {
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);

    let mut doc = SitemapDoc::default();
    let mut buf = Vec::new();
    let mut container = b"url".to_vec();
    let mut in_loc = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"sitemap" | b"url" => container = name.as_ref().to_vec(),
                    b"loc" => in_loc = true,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Ok(Event::Text(e)) => {
                if in_loc {
                    if let Ok(text) = e.unescape() {
                        let loc = text.trim().to_string();
                        if !loc.is_empty() {
                            if container.as_slice() == b"sitemap" {
                                doc.child_sitemaps.push(loc);
                            } else {
                                doc.urls.push(loc);
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("malformed sitemap entry, stopping parse: {e}");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    doc
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use bluesnake_core::Response;

    use super::*;

    #[test]
    fn parses_a_urlset() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/p1</loc><lastmod>2024-01-01</lastmod></url>
              <url><loc> https://example.com/p2 </loc></url>
            </urlset>"#;
        let doc = parse_sitemap(xml);
        assert_eq!(
            doc.urls,
            vec!["https://example.com/p1", "https://example.com/p2"]
        );
        assert!(doc.child_sitemaps.is_empty());
    }

    #[test]
    fn parses_a_sitemap_index() {
        let xml = br#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>https://example.com/sitemap-a.xml</loc></sitemap>
              <sitemap><loc>https://example.com/sitemap-b.xml</loc></sitemap>
            </sitemapindex>"#;
        let doc = parse_sitemap(xml);
        assert!(doc.urls.is_empty());
        assert_eq!(doc.child_sitemaps.len(), 2);
    }

    #[test]
    fn tolerates_malformed_entries() {
        let xml = br#"<urlset>
              <url><loc>https://example.com/good</loc></url>
              <url><loc></loc></url>
              <url>no loc here</url>"#;
        let doc = parse_sitemap(xml);
        assert_eq!(doc.urls, vec!["https://example.com/good"]);
    }

    fn routing_fetch(routes: Vec<(&str, &str)>) -> FetchFn {
        let routes: HashMap<String, String> = routes
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |url: String| {
            let body = routes.get(&url).cloned();
            Box::pin(async move {
                let (status, body) = match body {
                    Some(b) => (200u16, b.into_bytes()),
                    None => (404u16, Vec::new()),
                };
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

    #[tokio::test]
    async fn discovers_through_an_index() {
        let fetch = routing_fetch(vec![
            (
                "https://example.com/sitemap.xml",
                r#"<sitemapindex>
                    <sitemap><loc>https://example.com/sm-1.xml</loc></sitemap>
                   </sitemapindex>"#,
            ),
            (
                "https://example.com/sm-1.xml",
                r#"<urlset>
                    <url><loc>https://example.com/a</loc></url>
                    <url><loc>https://example.com/b</loc></url>
                   </urlset>"#,
            ),
        ]);
        let reader = SitemapReader::new(fetch);
        let base = Url::parse("https://example.com/").unwrap();
        let urls = reader.discover(&base, &[]).await;
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[tokio::test]
    async fn explicit_sitemaps_skip_probing() {
        let fetch = routing_fetch(vec![(
            "https://example.com/custom-map.xml",
            r#"<urlset><url><loc>https://example.com/x</loc></url></urlset>"#,
        )]);
        let reader = SitemapReader::new(fetch);
        let base = Url::parse("https://example.com/").unwrap();
        let urls = reader
            .discover(&base, &["https://example.com/custom-map.xml".to_string()])
            .await;
        assert_eq!(urls, vec!["https://example.com/x"]);
    }

    #[tokio::test]
    async fn cyclic_indexes_terminate() {
        let fetch = routing_fetch(vec![
            (
                "https://example.com/sitemap.xml",
                r#"<sitemapindex>
                    <sitemap><loc>https://example.com/sitemap.xml</loc></sitemap>
                   </sitemapindex>"#,
            ),
        ]);
        let reader = SitemapReader::new(fetch);
        let base = Url::parse("https://example.com/").unwrap();
        let urls = reader.discover(&base, &[]).await;
        assert!(urls.is_empty());
    }
}
