mod classify;
mod css;
mod hashing;
mod html;

pub use classify::{classify, infer_resource_type, path_type, rel_follows, SiteScope};
pub use css::extract_css_urls;
pub use hashing::ContentHasher;
pub use html::{extract_page, ExtractedRef, PageExtract};
