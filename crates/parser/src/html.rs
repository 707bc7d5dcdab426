use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use bluesnake_core::{LinkPosition, LinkType};

/// Max bytes to parse. Larger pages are truncated before parsing.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// A reference found in the DOM, before resolution and classification.
#[derive(Debug, Clone)]
pub struct ExtractedRef {
    pub href: String,
    pub link_type: LinkType,
    pub anchor_text: Option<String>,
    pub rel: Option<String>,
    pub target: Option<String>,
    pub position: LinkPosition,
    pub dom_path: String,
}

#[derive(Debug)]
pub struct PageExtract {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub h2: Option<String>,
    /// Absolute canonical URL, if declared.
    pub canonical: Option<String>,
    pub meta_noindex: bool,
    pub word_count: usize,
    /// `<base href>` when present, else the response's final URL.
    pub base_url: Url,
    pub refs: Vec<ExtractedRef>,
}

pub fn extract_page(html: &str, final_url: &Url) -> PageExtract {
    let html = if html.len() > MAX_PARSE_SIZE {
        let mut end = MAX_PARSE_SIZE;
        while !html.is_char_boundary(end) {
            end -= 1;
        }
        &html[..end]
    } else {
        html
    };
    let document = Html::parse_document(html);

    let base_url = selector("base[href]")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| final_url.join(href).ok())
        .unwrap_or_else(|| final_url.clone());

    let title = first_text(&document, "title");
    let meta_description = extract_meta_content(&document, "description");
    let h1 = first_text(&document, "h1");
    let h2 = first_text(&document, "h2");

    let canonical = selector("link[rel='canonical'][href]")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| base_url.join(href).ok())
        .map(|u| u.to_string());

    let meta_noindex = extract_meta_content(&document, "robots")
        .map(|content| content.to_ascii_lowercase().contains("noindex"))
        .unwrap_or(false);

    let word_count = visible_word_count(&document);
    let refs = extract_refs(&document);

    PageExtract {
        title,
        meta_description,
        h1,
        h2,
        canonical,
        meta_noindex,
        word_count,
        base_url,
        refs,
    }
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn first_text(document: &Html, sel: &str) -> Option<String> {
    selector(sel)
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn extract_meta_content(document: &Html, name: &str) -> Option<String> {
    let sel_str = format!("meta[name='{}'], meta[name='{}']", name, capitalize(name));
    selector(&sel_str)
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("content").map(|s| s.to_string()))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Whitespace-separated tokens in the body, with script/style/noscript
/// subtrees removed.
fn visible_word_count(document: &Html) -> usize {
    let Some(body) = selector("body").and_then(|s| document.select(&s).next()) else {
        return 0;
    };
    let mut text = String::new();
    collect_visible_text(*body, &mut text);
    text.split_whitespace().count()
}

fn collect_visible_text(node: NodeRef<'_, Node>, out: &mut String) {
    if let Some(el) = node.value().as_element() {
        if matches!(el.name(), "script" | "style" | "noscript") {
            return;
        }
    }
    if let Some(t) = node.value().as_text() {
        out.push_str(t);
        out.push(' ');
        return;
    }
    for child in node.children() {
        collect_visible_text(child, out);
    }
}

/// The full link inventory selector set.
fn extract_refs(document: &Html) -> Vec<ExtractedRef> {
    let mut refs = Vec::new();

    collect_group(document, "a[href]", "href", LinkType::Anchor, &mut refs);
    collect_group(document, "img[src]", "src", LinkType::Image, &mut refs);
    collect_group(document, "script[src]", "src", LinkType::Script, &mut refs);
    collect_group(document, "iframe[src]", "src", LinkType::Iframe, &mut refs);
    collect_group(document, "video[src]", "src", LinkType::Video, &mut refs);
    collect_group(document, "video source[src]", "src", LinkType::Video, &mut refs);
    collect_group(document, "audio[src]", "src", LinkType::Audio, &mut refs);
    collect_group(document, "audio source[src]", "src", LinkType::Audio, &mut refs);

    // <link> elements map to types by rel (and the `as` hint for
    // preload/prefetch).
    if let Some(sel) = selector("link[href]") {
        for el in document.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let rel = el.value().attr("rel").unwrap_or("").to_ascii_lowercase();
            let rels: Vec<&str> = rel.split_whitespace().collect();
            let link_type = if rels.contains(&"stylesheet") {
                LinkType::Stylesheet
            } else if rels.contains(&"canonical") {
                LinkType::Canonical
            } else if rels.contains(&"modulepreload") {
                LinkType::Script
            } else if rels.contains(&"preload") || rels.contains(&"prefetch") {
                type_from_as_hint(el.value().attr("as"))
            } else {
                continue;
            };
            refs.push(make_ref(&el, href, link_type));
        }
    }

    refs
}

fn collect_group(
    document: &Html,
    sel: &str,
    attr: &str,
    link_type: LinkType,
    out: &mut Vec<ExtractedRef>,
) {
    let Some(sel) = selector(sel) else { return };
    for el in document.select(&sel) {
        if let Some(href) = el.value().attr(attr) {
            out.push(make_ref(&el, href, link_type));
        }
    }
}

fn make_ref(el: &ElementRef, href: &str, link_type: LinkType) -> ExtractedRef {
    let anchor_text = if link_type == LinkType::Anchor {
        let t = el.text().collect::<String>().trim().to_string();
        if t.is_empty() {
            None
        } else {
            Some(t)
        }
    } else {
        None
    };
    ExtractedRef {
        href: href.to_string(),
        link_type,
        anchor_text,
        rel: el.value().attr("rel").map(|s| s.to_string()),
        target: el.value().attr("target").map(|s| s.to_string()),
        position: classify_position(el),
        dom_path: dom_path(el),
    }
}

fn type_from_as_hint(as_attr: Option<&str>) -> LinkType {
    match as_attr.map(|a| a.to_ascii_lowercase()).as_deref() {
        Some("style") => LinkType::Stylesheet,
        Some("script") => LinkType::Script,
        Some("font") => LinkType::Font,
        Some("image") => LinkType::Image,
        Some("video") => LinkType::Video,
        Some("audio") => LinkType::Audio,
        _ => LinkType::Other,
    }
}

/// Walk ancestors, preferring semantic landmarks, then class/id patterns.
fn classify_position(el: &ElementRef) -> LinkPosition {
    for ancestor in el.ancestors() {
        let Some(anc) = ElementRef::wrap(ancestor) else {
            continue;
        };
        let v = anc.value();
        let name = v.name();
        let role = v.attr("role").unwrap_or("").to_ascii_lowercase();
        let hints = format!(
            "{} {} {}",
            v.attr("class").unwrap_or(""),
            v.attr("id").unwrap_or(""),
            v.attr("aria-label").unwrap_or("")
        )
        .to_ascii_lowercase();

        if hints.contains("breadcrumb") {
            return LinkPosition::Breadcrumbs;
        }
        if hints.contains("pagination") || hints.contains("pager") {
            return LinkPosition::Pagination;
        }
        if name == "aside" || role == "complementary" || hints.contains("sidebar") {
            return LinkPosition::Sidebar;
        }
        if name == "nav" || role == "navigation" || hints.contains("navbar") || hints.contains("menu")
        {
            return LinkPosition::Navigation;
        }
        if name == "header" || role == "banner" || hints.contains("header") {
            return LinkPosition::Header;
        }
        if name == "footer" || role == "contentinfo" || hints.contains("footer") {
            return LinkPosition::Footer;
        }
        if name == "main" || name == "article" {
            return LinkPosition::Content;
        }
        if name == "body" {
            return LinkPosition::Content;
        }
    }
    LinkPosition::Unknown
}

/// Simplified `body > main > p > a` breadcrumb.
fn dom_path(el: &ElementRef) -> String {
    let mut parts = vec![el.value().name().to_string()];
    for ancestor in el.ancestors() {
        if let Some(anc) = ElementRef::wrap(ancestor) {
            let name = anc.value().name();
            if name == "html" {
                break;
            }
            parts.push(name.to_string());
        }
    }
    parts.reverse();
    parts.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/dir/page.html").unwrap()
    }

    #[test]
    fn extracts_title_meta_and_headings() {
        let html = r#"<html><head>
            <title> My Page </title>
            <meta name="description" content="A description">
            </head><body>
            <h1>First H1</h1><h1>Second H1</h1>
            <h2>First H2</h2>
            </body></html>"#;
        let page = extract_page(html, &base());
        assert_eq!(page.title.as_deref(), Some("My Page"));
        assert_eq!(page.meta_description.as_deref(), Some("A description"));
        assert_eq!(page.h1.as_deref(), Some("First H1"));
        assert_eq!(page.h2.as_deref(), Some("First H2"));
    }

    #[test]
    fn canonical_is_resolved_absolute() {
        let html = r#"<head><link rel="canonical" href="/canonical"></head>"#;
        let page = extract_page(html, &base());
        assert_eq!(
            page.canonical.as_deref(),
            Some("https://example.com/canonical")
        );
    }

    #[test]
    fn meta_robots_noindex_is_case_insensitive() {
        let html = r#"<head><meta name="robots" content="NOINDEX, follow"></head>"#;
        assert!(extract_page(html, &base()).meta_noindex);
        let html = r#"<head><meta name="robots" content="index, follow"></head>"#;
        assert!(!extract_page(html, &base()).meta_noindex);
    }

    #[test]
    fn word_count_skips_script_and_style() {
        let html = r#"<body>
            one two three
            <script>var x = "not counted at all";</script>
            <style>.a { color: red }</style>
            <noscript>hidden words</noscript>
            four</body>"#;
        assert_eq!(extract_page(html, &base()).word_count, 4);
    }

    #[test]
    fn base_href_wins_over_final_url() {
        let html = r#"<head><base href="https://cdn.example.com/assets/"></head>"#;
        let page = extract_page(html, &base());
        assert_eq!(page.base_url.as_str(), "https://cdn.example.com/assets/");
    }

    #[test]
    fn link_inventory_covers_the_selector_set() {
        let html = r#"<body>
            <a href="/a">anchor</a>
            <img src="/i.png">
            <script src="/s.js"></script>
            <link rel="stylesheet" href="/c.css">
            <link rel="preload" href="/f.woff2" as="font">
            <link rel="modulepreload" href="/m.js">
            <link rel="prefetch" href="/next.html" as="image">
            <iframe src="/frame"></iframe>
            <video src="/v.mp4"></video>
            <audio><source src="/a.mp3"></audio>
            </body>"#;
        let page = extract_page(html, &base());
        let types: Vec<LinkType> = page.refs.iter().map(|r| r.link_type).collect();
        assert!(types.contains(&LinkType::Anchor));
        assert!(types.contains(&LinkType::Image));
        assert!(types.contains(&LinkType::Script));
        assert!(types.contains(&LinkType::Stylesheet));
        assert!(types.contains(&LinkType::Font));
        assert!(types.contains(&LinkType::Iframe));
        assert!(types.contains(&LinkType::Video));
        assert!(types.contains(&LinkType::Audio));
        // modulepreload maps to script
        assert_eq!(
            page.refs
                .iter()
                .filter(|r| r.link_type == LinkType::Script)
                .count(),
            2
        );
    }

    #[test]
    fn positions_follow_landmarks() {
        let html = r#"<body>
            <nav><a href="/n">nav link</a></nav>
            <header><a href="/h">header link</a></header>
            <footer><a href="/f">footer link</a></footer>
            <aside><a href="/s">sidebar link</a></aside>
            <div class="breadcrumbs"><a href="/b">crumb</a></div>
            <main><p><a href="/c">content link</a></p></main>
            </body>"#;
        let page = extract_page(html, &base());
        let pos_of = |href: &str| {
            page.refs
                .iter()
                .find(|r| r.href == href)
                .map(|r| r.position)
                .unwrap()
        };
        assert_eq!(pos_of("/n"), LinkPosition::Navigation);
        assert_eq!(pos_of("/h"), LinkPosition::Header);
        assert_eq!(pos_of("/f"), LinkPosition::Footer);
        assert_eq!(pos_of("/s"), LinkPosition::Sidebar);
        assert_eq!(pos_of("/b"), LinkPosition::Breadcrumbs);
        assert_eq!(pos_of("/c"), LinkPosition::Content);
    }

    #[test]
    fn dom_path_reads_top_down() {
        let html = r#"<body><main><article><p><a href="/x">x</a></p></article></main></body>"#;
        let page = extract_page(html, &base());
        assert_eq!(page.refs[0].dom_path, "body > main > article > p > a");
    }
}
