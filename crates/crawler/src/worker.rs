use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use bluesnake_core::{
    CrawlError, DiscoveredUrl, DiscoverySource, Link, LinkInventory, LinkType, PageResult,
    ResourceResult, Response, UrlMetadata,
};
use bluesnake_fetcher::FetchRequest;
use bluesnake_parser::{classify, extract_css_urls, extract_page, PageExtract};

use crate::engine::Engine;

/// The per-URL lifecycle that runs on a pool worker: fetch, split by media
/// type, parse, queue discoveries, emit exactly one result per URL (plus one
/// per redirect hop).
pub async fn run_fetch_task(engine: Arc<Engine>, req: DiscoveredUrl, normalized_url: String) {
    // Subscribe before checking the flag: stop() sets the flag before it
    // broadcasts, so one of the two always observes a cancellation.
    let mut shutdown = engine.shutdown_tx.subscribe();
    if engine.is_cancelled() {
        handle_fetch_error(&engine, &req, CrawlError::Cancelled);
        return;
    }

    let request = FetchRequest::get(normalized_url).with_depth(req.depth);
    let hook = engine.redirect_hook();
    let result = tokio::select! {
        res = engine.fetcher.fetch(request, Some(hook)) => res,
        _ = shutdown.recv() => Err(CrawlError::Cancelled),
    };

    match result {
        Ok(resp) => handle_response(&engine, &req, resp).await,
        Err(e) => handle_fetch_error(&engine, &req, e),
    }
}

fn handle_fetch_error(engine: &Arc<Engine>, req: &DiscoveredUrl, err: CrawlError) {
    if !err.is_reportable() {
        debug!(url = %req.url, "redirect landed on an already-visited URL");
        return;
    }
    warn!(url = %req.url, "fetch failed: {err}");
    emit_resource(
        engine,
        ResourceResult {
            url: req.url.clone(),
            status: 0,
            content_type: None,
            error: Some(err.to_string()),
            depth: req.depth,
        },
    );
}

async fn handle_response(engine: &Arc<Engine>, req: &DiscoveredUrl, resp: Response) {
    let final_is_html = resp.is_html();
    let content_type = resp.content_type().map(str::to_string);

    // Intermediate hops carry no body; they are typed by where the chain
    // ended up.
    for hop in &resp.redirect_chain {
        if final_is_html || resp.status == 304 {
            emit_page(
                engine,
                empty_page(hop.url.clone(), resp.final_url.clone(), hop.status, req.depth),
            );
        } else {
            emit_resource(
                engine,
                ResourceResult {
                    url: hop.url.clone(),
                    status: hop.status,
                    content_type: content_type.clone(),
                    error: None,
                    depth: req.depth,
                },
            );
        }
    }

    // Not modified: the persistence layer already has this page; skip the
    // parse pipeline entirely.
    if resp.status == 304 {
        emit_page(
            engine,
            empty_page(resp.final_url.clone(), resp.final_url.clone(), 304, req.depth),
        );
        return;
    }

    if final_is_html {
        handle_page(engine, req, resp).await;
    } else {
        handle_resource(engine, req, resp);
    }
}

async fn handle_page(engine: &Arc<Engine>, req: &DiscoveredUrl, resp: Response) {
    let final_url = match Url::parse(&resp.final_url) {
        Ok(u) => u,
        Err(e) => {
            warn!(url = %resp.final_url, "unparseable final URL: {e}");
            return;
        }
    };

    let status_error = if resp.status >= 203 {
        Some(format!("HTTP status {}", resp.status))
    } else {
        None
    };
    let parse_body = status_error.is_none() || engine.config.parse_http_error_responses;

    let body_str = String::from_utf8_lossy(&resp.body).into_owned();
    let (extract, links) = if parse_body {
        let extract = extract_page(&body_str, &final_url);
        let links = build_inventory(engine, &extract);
        (Some(extract), links)
    } else {
        (None, LinkInventory::default())
    };

    let (content_hash, is_duplicate) = match (&engine.hasher, parse_body) {
        (Some(hasher), true) => {
            let (hash, dup) = hasher.hash_and_check(&body_str, &resp.final_url);
            (Some(hash), dup)
        }
        _ => (None, false),
    };

    let meta_noindex = extract.as_ref().map(|e| e.meta_noindex).unwrap_or(false);
    let header_noindex = resp
        .headers
        .get("x-robots-tag")
        .map(|v| v.to_ascii_lowercase().contains("noindex"))
        .unwrap_or(false);
    let indexable = resp.status < 400
        && !header_noindex
        && !(meta_noindex && engine.config.respect_meta_robots_noindex);

    // Queue discoveries before emitting: the child increments land while
    // this task still holds its own work unit.
    if parse_body {
        for link in links.iter() {
            queue_link(engine, req, &resp.final_url, link);
        }
    }

    let title = extract.as_ref().and_then(|e| e.title.clone());
    engine.store.store_metadata(
        &resp.final_url,
        UrlMetadata {
            status: resp.status,
            title: title.clone(),
            content_type: resp.content_type().map(str::to_string),
        },
    );

    let page = PageResult {
        url: resp.final_url.clone(),
        final_url: resp.final_url.clone(),
        status: resp.status,
        depth: req.depth,
        title,
        meta_description: extract.as_ref().and_then(|e| e.meta_description.clone()),
        h1: extract.as_ref().and_then(|e| e.h1.clone()),
        h2: extract.as_ref().and_then(|e| e.h2.clone()),
        canonical: extract.as_ref().and_then(|e| e.canonical.clone()),
        word_count: extract.as_ref().map(|e| e.word_count).unwrap_or(0),
        indexable,
        links,
        content_hash,
        is_duplicate_content: is_duplicate,
        redirect_chain: resp.redirect_chain.clone(),
        content_type: resp.content_type().map(str::to_string),
        error: status_error,
        body: Arc::new(resp.body),
    };
    emit_page(engine, page);
}

fn handle_resource(engine: &Arc<Engine>, req: &DiscoveredUrl, resp: Response) {
    // CSS bodies feed the discovery loop with their url(...) references.
    if resp.is_css() && engine.config.spider_enabled() {
        if let Ok(base) = Url::parse(&resp.final_url) {
            let css = String::from_utf8_lossy(&resp.body);
            for raw in extract_css_urls(&css) {
                if let Ok(abs) = base.join(&raw) {
                    if abs.scheme() == "http" || abs.scheme() == "https" {
                        engine.queue_url(DiscoveredUrl::child(
                            abs.to_string(),
                            DiscoverySource::Network,
                            &resp.final_url,
                            req.depth,
                        ));
                    }
                }
            }
        }
    }

    engine.store.store_metadata(
        &resp.final_url,
        UrlMetadata {
            status: resp.status,
            title: None,
            content_type: resp.content_type().map(str::to_string),
        },
    );

    let error = if resp.status >= 203 {
        Some(format!("HTTP status {}", resp.status))
    } else {
        None
    };
    emit_resource(
        engine,
        ResourceResult {
            url: resp.final_url.clone(),
            status: resp.status,
            content_type: resp.content_type().map(str::to_string),
            error,
            depth: req.depth,
        },
    );
}

fn build_inventory(engine: &Arc<Engine>, extract: &PageExtract) -> LinkInventory {
    let mut inventory = LinkInventory::default();
    for raw in &extract.refs {
        if let Some(mut link) = classify(raw, &extract.base_url, &engine.scope) {
            if let Some(meta) = engine.store.metadata(&link.url) {
                link.last_seen_status = Some(meta.status);
                link.last_seen_title = meta.title;
            }
            if link.is_internal {
                inventory.internal.push(link);
            } else {
                inventory.external.push(link);
            }
        }
    }
    inventory
}

fn queue_link(engine: &Arc<Engine>, req: &DiscoveredUrl, parent: &str, link: &Link) {
    if !engine.config.spider_enabled() {
        return;
    }
    if !link.follow {
        let follow_anyway = if link.is_internal {
            engine.config.follow_internal_nofollow
        } else {
            engine.config.follow_external_nofollow
        };
        if !follow_anyway {
            return;
        }
    }
    let source = match link.link_type {
        LinkType::Anchor | LinkType::Iframe | LinkType::Canonical => DiscoverySource::Spider,
        _ => DiscoverySource::Resource,
    };
    engine.queue_url(DiscoveredUrl::child(
        link.url.clone(),
        source,
        parent,
        req.depth,
    ));
}

fn empty_page(url: String, final_url: String, status: u16, depth: u32) -> PageResult {
    PageResult {
        url,
        final_url,
        status,
        depth,
        title: None,
        meta_description: None,
        h1: None,
        h2: None,
        canonical: None,
        word_count: 0,
        indexable: false,
        links: LinkInventory::default(),
        content_hash: None,
        is_duplicate_content: false,
        redirect_chain: Vec::new(),
        content_type: None,
        error: None,
        body: Arc::new(Vec::new()),
    }
}

fn emit_page(engine: &Arc<Engine>, page: PageResult) {
    if let Some(cb) = &engine.callbacks.on_page_crawled {
        cb(page);
    }
}

fn emit_resource(engine: &Arc<Engine>, resource: ResourceResult) {
    if let Some(cb) = &engine.callbacks.on_resource_visit {
        cb(resource);
    }
}
