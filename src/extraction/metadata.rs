//! Page metadata extraction
//!
//! This module resolves the page title and collects description, keywords,
//! author, language, images and links. Every field degrades to absent when
//! the page does not provide it.

use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

use super::content::normalize_text;
use super::links::LinkExtractor;
use super::selector;
use crate::error::Result;

/// Title used when the page offers no candidate at all.
pub const FALLBACK_TITLE: &str = "Untitled page";

/// Extracted page metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// URL the document was retrieved from, as given by the caller
    pub source_url: String,
    /// Meta description
    pub description: Option<String>,
    /// Meta keywords, verbatim
    pub keywords: Option<String>,
    /// Author
    pub author: Option<String>,
    /// Document language
    pub language: Option<String>,
    /// Length of the extracted body in characters
    pub content_length: usize,
    /// Absolute image URLs in document order
    pub images: Vec<String>,
    /// Absolute link URLs in document order
    pub links: Vec<String>,
}

/// Metadata extraction functionality
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Resolve the page title.
    ///
    /// Priority: `<title>`, first `<h1>`, `og:title`, then [`FALLBACK_TITLE`].
    pub fn title(document: &Html) -> Result<String> {
        let candidates = [
            Self::element_text(document, "title")?,
            Self::element_text(document, "h1")?,
            Self::meta_content(document, "meta[property=\"og:title\"]")?,
        ];

        Ok(candidates
            .into_iter()
            .flatten()
            .next()
            .unwrap_or_else(|| FALLBACK_TITLE.to_string()))
    }

    /// Extract all metadata from the document.
    ///
    /// `base` is the parsed form of `source_url` and is used to resolve
    /// relative image and link references.
    pub fn extract(
        document: &Html,
        base: &Url,
        source_url: &str,
        content_length: usize,
    ) -> Result<Metadata> {
        let description = Self::first_meta(
            document,
            &[
                "meta[name=\"description\"]",
                "meta[property=\"og:description\"]",
                "meta[name=\"twitter:description\"]",
            ],
        )?;

        let keywords = Self::meta_content(document, "meta[name=\"keywords\"]")?;

        let author = match Self::first_meta(
            document,
            &["meta[name=\"author\"]", "meta[property=\"article:author\"]"],
        )? {
            Some(author) => Some(author),
            None => Self::element_text(document, "[rel=\"author\"]")?,
        };

        let language = match non_empty(document.root_element().value().attr("lang")) {
            Some(lang) => Some(lang),
            None => Self::content_language(document)?,
        };

        Ok(Metadata {
            source_url: source_url.to_string(),
            description,
            keywords,
            author,
            language,
            content_length,
            images: LinkExtractor::images(document, base)?,
            links: LinkExtractor::links(document, base)?,
        })
    }

    /// First non-empty `content` attribute across the given meta selectors
    fn first_meta(document: &Html, selectors: &[&str]) -> Result<Option<String>> {
        for css in selectors {
            if let Some(content) = Self::meta_content(document, css)? {
                return Ok(Some(content));
            }
        }
        Ok(None)
    }

    /// `content` attribute of the first element matching `css`
    fn meta_content(document: &Html, css: &str) -> Result<Option<String>> {
        let sel = selector(css)?;
        Ok(document
            .select(&sel)
            .next()
            .and_then(|el| non_empty(el.value().attr("content"))))
    }

    /// Normalized text of the first element matching `css`
    fn element_text(document: &Html, css: &str) -> Result<Option<String>> {
        let sel = selector(css)?;
        Ok(document.select(&sel).next().and_then(|el| {
            let text = normalize_text(&el.text().collect::<String>());
            (!text.is_empty()).then_some(text)
        }))
    }

    /// `meta[http-equiv=content-language]`, matching the attribute value case-insensitively
    fn content_language(document: &Html) -> Result<Option<String>> {
        let sel = selector("meta[http-equiv]")?;
        Ok(document
            .select(&sel)
            .find(|el| {
                el.value()
                    .attr("http-equiv")
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("content-language"))
            })
            .and_then(|el| non_empty(el.value().attr("content"))))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
