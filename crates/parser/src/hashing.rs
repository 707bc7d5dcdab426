use dashmap::DashMap;
use ego_tree::NodeRef;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};
use sha2::{Digest, Sha256};

use bluesnake_core::{ContentHashAlgorithm, ContentHashConfig};

/// Common machine-readable timestamp shapes (ISO 8601 and friends) blanked
/// out before hashing when configured.
static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?")
        .expect("valid timestamp regex")
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Normalized content fingerprinting with a session-scoped duplicate
/// registry. Two pages are duplicates when their canonicalized bodies hash
/// identically but their URLs differ.
pub struct ContentHasher {
    config: ContentHashConfig,
    /// hash -> first URL observed with it
    seen: DashMap<String, String>,
}

impl ContentHasher {
    pub fn new(config: ContentHashConfig) -> Self {
        Self {
            config,
            seen: DashMap::new(),
        }
    }

    /// Hash a page and report whether the same content was already seen on a
    /// different URL earlier in this session.
    pub fn hash_and_check(&self, html: &str, url: &str) -> (String, bool) {
        let hash = self.hash(html);
        let mut duplicate = false;
        match self.seen.entry(hash.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                duplicate = entry.get() != url;
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(url.to_string());
            }
        }
        (hash, duplicate)
    }

    pub fn hash(&self, html: &str) -> String {
        let canonical = self.canonicalize(html);
        self.digest(&canonical)
    }

    fn canonicalize(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let mut out = String::new();
        // With include-only tags configured, serialization starts inactive
        // and switches on at matching subtree roots.
        let active = self.config.include_only_tags.is_empty();
        for child in document.tree.root().children() {
            self.serialize(child, &mut out, active);
        }

        let mut canonical = out;
        if self.config.strip_timestamps {
            canonical = TIMESTAMP_RE.replace_all(&canonical, "").into_owned();
        }
        if self.config.collapse_whitespace {
            canonical = WHITESPACE_RE.replace_all(&canonical, " ").trim().to_string();
        }
        canonical
    }

    fn serialize(&self, node: NodeRef<'_, Node>, out: &mut String, active: bool) {
        match node.value() {
            Node::Text(text) => {
                if active {
                    out.push_str(text);
                }
            }
            Node::Comment(comment) => {
                if active && !self.config.strip_comments {
                    out.push_str("<!--");
                    out.push_str(comment);
                    out.push_str("-->");
                }
            }
            Node::Element(el) => {
                let name = el.name();
                if self.config.exclude_tags.iter().any(|t| t == name) {
                    return;
                }
                let active = active
                    || self
                        .config
                        .include_only_tags
                        .iter()
                        .any(|t| t == name);
                if active {
                    out.push('<');
                    out.push_str(name);
                    out.push('>');
                }
                for child in node.children() {
                    self.serialize(child, out, active);
                }
                if active {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
            _ => {
                for child in node.children() {
                    self.serialize(child, out, active);
                }
            }
        }
    }

    fn digest(&self, canonical: &str) -> String {
        match self.config.algorithm {
            ContentHashAlgorithm::Xxhash => {
                format!("{:016x}", xxhash_rust::xxh3::xxh3_64(canonical.as_bytes()))
            }
            ContentHashAlgorithm::Md5 => format!("{:x}", md5::compute(canonical.as_bytes())),
            ContentHashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(canonical.as_bytes());
                format!("{:x}", hasher.finalize())
            }
        }
    }
}
