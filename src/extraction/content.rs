//! Main content extraction
//!
//! This module turns a raw HTML document into a title, a normalized body
//! text and page metadata. Body selection walks an ordered list of
//! "likely main content" selectors and keeps the first block whose text is
//! long enough; otherwise the whole `<body>` is used.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::metadata::{Metadata, MetadataExtractor};
use super::selector;
use crate::error::{ExtractionError, Result};

/// Candidate selectors for the main content block, in priority order.
pub const CONTENT_SELECTORS: [&str; 10] = [
    "article",
    "main",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-content",
    "#content",
    ".main-content",
    "section",
    "[role=\"main\"]",
];

/// A candidate block is accepted only when its normalized text is longer than this.
pub const MIN_CONTENT_LENGTH: usize = 100;

/// Subtrees skipped when collecting text from the chosen scope.
pub const NOISE_SELECTORS: [&str; 8] = [
    "script",
    "style",
    "nav",
    "header",
    "footer",
    "aside",
    ".advertisement",
    ".ads",
];

/// Result of a single extraction call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Best-effort page title, never empty
    pub title: String,
    /// Normalized body text
    pub body: String,
    /// Page metadata
    pub metadata: Metadata,
}

/// Body text together with the selector that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyText {
    /// Normalized text of the chosen scope
    pub text: String,
    /// Candidate selector that matched, `None` when the document body was used
    pub matched_selector: Option<&'static str>,
}

impl BodyText {
    /// Whether the text came from a candidate block rather than the fallback
    pub fn from_main(&self) -> bool {
        self.matched_selector.is_some()
    }
}

/// Content extraction functionality
pub struct ContentExtractor;

impl ContentExtractor {
    /// Extract title, body and metadata from an HTML document.
    ///
    /// `source_url` must be an absolute URL; it is only used to resolve
    /// relative image and link references and is never fetched.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::MalformedInput`] when `source_url` cannot be
    /// parsed. Missing titles, meta tags or unresolvable references never fail
    /// the extraction.
    #[instrument(skip(html), fields(html_len = html.len()))]
    pub fn extract(html: &str, source_url: &str) -> Result<ExtractionResult> {
        let base = Url::parse(source_url)
            .map_err(|e| ExtractionError::MalformedInput(format!("{}: {}", source_url, e)))?;

        let document = Html::parse_document(html);

        let title = MetadataExtractor::title(&document)?;
        let body = Self::extract_body(&document)?;
        let content_length = body.text.chars().count();
        let metadata =
            MetadataExtractor::extract(&document, &base, source_url, content_length)?;

        debug!(
            "Extracted {} chars, from_main={}, images={}, links={}",
            content_length,
            body.from_main(),
            metadata.images.len(),
            metadata.links.len()
        );

        Ok(ExtractionResult {
            title,
            body: body.text,
            metadata,
        })
    }

    /// Pick the content scope and return its normalized text.
    ///
    /// The first candidate in [`CONTENT_SELECTORS`] whose first match has more
    /// than [`MIN_CONTENT_LENGTH`] characters of normalized text wins. Noise
    /// subtrees are removed only from the chosen scope.
    pub fn extract_body(document: &Html) -> Result<BodyText> {
        let noise = NOISE_SELECTORS
            .iter()
            .map(|css| selector(css))
            .collect::<Result<Vec<_>>>()?;

        for css in CONTENT_SELECTORS {
            let candidate = selector(css)?;
            let Some(element) = document.select(&candidate).next() else {
                continue;
            };

            let raw: String = element.text().collect();
            if normalize_text(&raw).chars().count() > MIN_CONTENT_LENGTH {
                debug!("Main content matched selector {}", css);
                return Ok(BodyText {
                    text: normalize_text(&Self::collect_text(element, &noise)),
                    matched_selector: Some(css),
                });
            }
        }

        debug!("No content block qualified, using document body");
        let body = selector("body")?;
        let scope = document
            .select(&body)
            .next()
            .unwrap_or_else(|| document.root_element());

        Ok(BodyText {
            text: normalize_text(&Self::collect_text(scope, &noise)),
            matched_selector: None,
        })
    }

    /// Concatenate the text nodes under `scope`, skipping any element that
    /// matches one of the `skip` selectors together with its subtree.
    fn collect_text(scope: ElementRef<'_>, skip: &[Selector]) -> String {
        let mut out = String::new();
        let mut stack: Vec<_> = scope.children().rev().collect();

        while let Some(node) = stack.pop() {
            match node.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => {
                    let skipped = ElementRef::wrap(node)
                        .map(|el| skip.iter().any(|s| s.matches(&el)))
                        .unwrap_or(false);
                    if !skipped {
                        stack.extend(node.children().rev());
                    }
                }
                _ => {}
            }
        }

        out
    }
}

/// Collapse whitespace runs (including blank lines) to single spaces and trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
