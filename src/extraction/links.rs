//! Image and link extraction
//!
//! References are resolved against the page URL with standard URL joining.
//! Only empty attributes are skipped: a blank reference resolves to the page
//! itself. Anything that fails to resolve is dropped rather than kept verbatim.

use scraper::Html;
use url::Url;

use super::selector;
use crate::error::Result;

/// Maximum number of image URLs kept per page.
pub const MAX_IMAGES: usize = 10;

/// Maximum number of link URLs kept per page.
pub const MAX_LINKS: usize = 20;

/// Link and image extraction functionality
pub struct LinkExtractor;

impl LinkExtractor {
    /// Resolved `img[src]` URLs, first [`MAX_IMAGES`] in document order
    pub fn images(document: &Html, base: &Url) -> Result<Vec<String>> {
        Self::resolved_attrs(document, base, "img[src]", "src", MAX_IMAGES)
    }

    /// Resolved `a[href]` URLs, first [`MAX_LINKS`] in document order
    pub fn links(document: &Html, base: &Url) -> Result<Vec<String>> {
        Self::resolved_attrs(document, base, "a[href]", "href", MAX_LINKS)
    }

    fn resolved_attrs(
        document: &Html,
        base: &Url,
        css: &str,
        attr: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let sel = selector(css)?;
        Ok(document
            .select(&sel)
            .filter_map(|el| el.value().attr(attr))
            .filter(|reference| !reference.is_empty())
            .filter_map(|reference| resolve_url(base, reference))
            .take(limit)
            .collect())
    }
}

/// Resolve a possibly-relative reference against `base`.
///
/// Returns `None` when the reference cannot be resolved.
pub fn resolve_url(base: &Url, reference: &str) -> Option<String> {
    base.join(reference.trim()).ok().map(String::from)
}
