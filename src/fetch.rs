//! Page fetching
//!
//! This module is the network stage in front of the extractor: it downloads a
//! page over HTTP and either hands back the decoded text or a [`FetchError`]
//! describing why it could not. The extractor is never invoked on failure.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{Error, ExtractionError, FetchError, FetchErrorKind, Result};
use crate::extraction::{ContentExtractor, ExtractionResult};

/// Browser-like user agent sent with every request
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Options for page fetching
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Maximum number of redirects to follow
    pub max_redirects: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_redirects: 10,
        }
    }
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status: u16,
    /// Decoded response body
    pub html: String,
}

/// HTTP page fetcher
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    /// Create a fetcher with the given options
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .build()
            .map_err(|e| Error::generic(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Fetch a page and return its decoded body.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Fetch of {} failed with status {}", url, status);
            return Err(FetchError::from_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown status"),
            ));
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(|e| {
            FetchError::new(
                FetchErrorKind::Body,
                format!("Failed to read response body: {}", e),
            )
        })?;

        info!("Fetched {} ({} bytes)", final_url, html.len());

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            html,
        })
    }
}

fn classify_transport_error(url: &str, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::new(
            FetchErrorKind::Timeout,
            format!("Timeout while fetching {}", url),
        )
    } else if err.is_connect() {
        FetchError::new(
            FetchErrorKind::Connection,
            format!("Connection failed: {}", err),
        )
    } else {
        FetchError::new(FetchErrorKind::Request, format!("Request error: {}", err))
    }
}

/// A scraped page ready to be stored
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedPage {
    /// Extraction output
    #[serde(flatten)]
    pub extraction: ExtractionResult,
    /// When the page was processed
    pub processed_at: DateTime<Utc>,
}

/// Fetch-then-extract pipeline for web pages
#[derive(Debug, Clone)]
pub struct WebScraper {
    fetcher: PageFetcher,
}

impl WebScraper {
    /// Create a scraper around a fetcher
    pub fn new(fetcher: PageFetcher) -> Self {
        Self { fetcher }
    }

    /// Validate, fetch and extract a page.
    ///
    /// The URL is checked before any network access. Extraction runs on the
    /// blocking pool since HTML parsing is CPU-bound.
    #[instrument(skip(self))]
    pub async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        validate_url(url)?;

        let page = self.fetcher.fetch(url).await?;

        let source_url = page.url;
        let html = page.html;
        let extraction =
            tokio::task::spawn_blocking(move || ContentExtractor::extract(&html, &source_url))
                .await
                .map_err(|e| Error::generic(format!("Extraction task failed: {}", e)))??;

        info!(
            "Scraped \"{}\" ({} chars)",
            extraction.title, extraction.metadata.content_length
        );

        Ok(ScrapedPage {
            extraction,
            processed_at: Utc::now(),
        })
    }
}

/// Check that `url` is an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|e| ExtractionError::MalformedInput(format!("{}: {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ExtractionError::MalformedInput(format!(
            "{}: unsupported scheme '{}'",
            url, other
        ))
        .into()),
    }
}
