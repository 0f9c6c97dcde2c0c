//! Content extraction module
//!
//! This module extracts a title, normalized body text and metadata from raw
//! HTML. It performs no I/O: callers fetch the page first and hand over the
//! document text together with the URL it came from.

pub mod content;
pub mod links;
pub mod metadata;

pub use content::{
    normalize_text, BodyText, ContentExtractor, ExtractionResult, CONTENT_SELECTORS,
    MIN_CONTENT_LENGTH, NOISE_SELECTORS,
};
pub use links::{resolve_url, LinkExtractor, MAX_IMAGES, MAX_LINKS};
pub use metadata::{Metadata, MetadataExtractor, FALLBACK_TITLE};

use crate::error::{ExtractionError, Result};
use scraper::Selector;

/// Compile a CSS selector
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| ExtractionError::InvalidSelector(format!("{}: {:?}", css, e)).into())
}
