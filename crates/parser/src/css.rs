use once_cell::sync::Lazy;
use regex::Regex;

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment regex"));

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'"()\s]+)['"]?\s*\)"#).expect("valid url regex"));

/// Extract `url(...)` tokens from a CSS body. Comments are stripped first so
/// commented-out references don't leak; `data:` URIs are never references.
pub fn extract_css_urls(css: &str) -> Vec<String> {
    let stripped = COMMENT_RE.replace_all(css, "");
    URL_RE
        .captures_iter(&stripped)
        .filter_map(|cap| {
            let raw = cap[1].trim();
            if raw.is_empty() || raw.to_ascii_lowercase().starts_with("data:") {
                None
            } else {
                Some(raw.to_string())
            }
        })
        .collect()
}
