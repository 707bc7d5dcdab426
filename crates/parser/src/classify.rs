use url::Url;

use bluesnake_core::{CrawlError, Link, LinkType, PathType};

use crate::html::ExtractedRef;

/// The crawl's root domain, derived from the seed URL. Internal/external
/// classification treats the root and its subdomains as one site; a
/// non-default port makes an otherwise-equal host a different site.
#[derive(Debug, Clone)]
pub struct SiteScope {
    host: String,
    port: u16,
}

impl SiteScope {
    pub fn from_url(url: &Url) -> Result<Self, CrawlError> {
        let host = url
            .host_str()
            .ok_or_else(|| CrawlError::InvalidUrl(format!("no host in {url}")))?
            .to_ascii_lowercase();
        let port = url.port_or_known_default().unwrap_or(0);
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_internal(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if url.port_or_known_default().unwrap_or(0) != self.port {
            return false;
        }
        let host = host.to_ascii_lowercase();
        host == self.host
            || is_subdomain_of(&host, &self.host)
            || is_subdomain_of(&self.host, &host)
    }
}

fn is_subdomain_of(host: &str, root: &str) -> bool {
    host.strip_suffix(root)
        .map(|prefix| prefix.ends_with('.'))
        .unwrap_or(false)
}

pub fn path_type(href: &str) -> PathType {
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || href.starts_with("//") {
        PathType::Absolute
    } else if href.starts_with('/') {
        PathType::RootRelative
    } else {
        PathType::Relative
    }
}

/// rel-based follow verdict: any of nofollow/sponsored/ugc kills it.
pub fn rel_follows(rel: Option<&str>) -> bool {
    let Some(rel) = rel else { return true };
    !rel.to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == ',')
        .any(|token| matches!(token, "nofollow" | "sponsored" | "ugc"))
}

/// Refine ambiguous element types by file extension.
pub fn infer_resource_type(url: &Url, declared: LinkType) -> LinkType {
    if declared != LinkType::Other {
        return declared;
    }
    let path = url.path().to_ascii_lowercase();
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "woff" | "woff2" | "ttf" | "otf" | "eot" => LinkType::Font,
        "css" => LinkType::Stylesheet,
        "js" | "mjs" => LinkType::Script,
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "avif" => LinkType::Image,
        "mp4" | "webm" | "mov" | "mkv" => LinkType::Video,
        "mp3" | "wav" | "ogg" | "m4a" | "flac" => LinkType::Audio,
        _ => LinkType::Other,
    }
}

/// Non-crawlable URL schemes, checked before resolution.
fn is_unfetchable(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
}

/// Resolve and classify one extracted reference. Returns None for pure
/// fragments, unfetchable schemes, and hrefs that don't resolve.
pub fn classify(raw: &ExtractedRef, base: &Url, scope: &SiteScope) -> Option<Link> {
    let href = raw.href.trim();
    if href.is_empty() || href.starts_with('#') || is_unfetchable(href) {
        return None;
    }

    let resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    Some(Link {
        url: resolved.to_string(),
        link_type: infer_resource_type(&resolved, raw.link_type),
        anchor_text: raw.anchor_text.clone(),
        rel: raw.rel.clone(),
        target: raw.target.clone(),
        path_type: path_type(href),
        is_internal: scope.is_internal(&resolved),
        follow: rel_follows(raw.rel.as_deref()),
        position: raw.position,
        dom_path: raw.dom_path.clone(),
        last_seen_status: None,
        last_seen_title: None,
    })
}
