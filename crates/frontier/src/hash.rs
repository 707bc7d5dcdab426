use std::hash::Hasher;

use fnv::FnvHasher;
use url::Url;

use bluesnake_core::CrawlError;

/// Normalize a URL for identity purposes: parsing lowercases the scheme and
/// host and applies percent-encoding; the fragment is stripped because it
/// never changes the fetched resource.
pub fn normalize_url(raw: &str) -> Result<String, CrawlError> {
    let mut url = Url::parse(raw).map_err(|e| CrawlError::InvalidUrl(format!("{raw}: {e}")))?;
    url.set_fragment(None);
    Ok(url.into())
}

/// FNV-64a over an already-normalized URL string.
pub fn hash_normalized(normalized: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(normalized.as_bytes());
    hasher.finish()
}

/// Normalize then hash. Two URLs are "the same" iff this value is equal.
pub fn url_hash(raw: &str) -> Result<u64, CrawlError> {
    Ok(hash_normalized(&normalize_url(raw)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_and_host_are_case_insensitive() {
        let a = url_hash("HTTPS://Example.COM/Path").unwrap();
        let b = url_hash("https://example.com/Path").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn path_case_is_significant() {
        let a = url_hash("https://example.com/Path").unwrap();
        let b = url_hash("https://example.com/path").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn fragments_do_not_change_identity() {
        let a = url_hash("https://example.com/p#top").unwrap();
        let b = url_hash("https://example.com/p").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_urls_are_rejected() {
        assert!(url_hash("not a url").is_err());
    }
}
