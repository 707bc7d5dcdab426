use regex::Regex;
use url::Url;

use bluesnake_core::{CrawlConfig, CrawlError};

/// Compiled URL filter set: domain allow/block lists and regex allow/deny
/// over the full URL. Applied by the Processor to every discovered URL and
/// by the redirect hook to every hop destination.
pub struct UrlFilters {
    allowed_domains: Vec<String>,
    disallowed_domains: Vec<String>,
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl UrlFilters {
    pub fn from_config(config: &CrawlConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            allowed_domains: lowercase_all(&config.allowed_domains),
            disallowed_domains: lowercase_all(&config.disallowed_domains),
            allow: compile_all(&config.url_filters)?,
            deny: compile_all(&config.disallowed_url_filters)?,
        })
    }

    pub fn allows(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or("").to_ascii_lowercase();

        if !self.allowed_domains.is_empty()
            && !self.allowed_domains.iter().any(|d| domain_match(&host, d))
        {
            return false;
        }
        if self.disallowed_domains.iter().any(|d| domain_match(&host, d)) {
            return false;
        }

        let full = url.as_str();
        if !self.allow.is_empty() && !self.allow.iter().any(|re| re.is_match(full)) {
            return false;
        }
        if self.deny.iter().any(|re| re.is_match(full)) {
            return false;
        }
        true
    }
}

fn domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

fn lowercase_all(domains: &[String]) -> Vec<String> {
    domains.iter().map(|d| d.to_ascii_lowercase()).collect()
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, CrawlError> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| CrawlError::Config(format!("bad URL filter {p}: {e}"))))
        .collect()
}
