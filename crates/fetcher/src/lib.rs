mod cache;
mod charset;
mod client;

pub use cache::{cache_key, ResponseCache};
pub use charset::{canonicalize_utf8, is_text_media};
pub use client::{fetch_fn, FetchRequest, Fetcher, RedirectHook, MAX_REDIRECT_HOPS};

pub use reqwest::Method;
