//! CORS configuration for the Plin Web API
//!
//! Browsers on the same machine (any port on `localhost`, `127.0.0.1` or
//! `[::1]`) are always allowed. Additional origins must be listed explicitly
//! and are matched exactly.
//!
//! ```rust,no_run
//! use axum::Router;
//! use plin_web::cors::{cors_layer, CorsConfig};
//!
//! let app: Router = Router::new()
//!     .layer(cors_layer(CorsConfig::default().with_origin("https://app.example.com")));
//! ```

use std::time::Duration;

use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer};
use url::Url;

/// Request headers browsers may send
pub const ALLOWED_HEADERS: [HeaderName; 2] = [CONTENT_TYPE, AUTHORIZATION];

/// Methods used by the API
pub const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// CORS configuration options
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Origins allowed in addition to localhost, matched exactly
    pub extra_origins: Vec<String>,
    /// Maximum age for preflight cache in seconds
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            extra_origins: Vec::new(),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

impl CorsConfig {
    /// Allow one more origin
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        self.extra_origins
            .push(origin.trim_end_matches('/').to_ascii_lowercase());
        self
    }

    /// Set the maximum age for preflight cache
    pub fn with_max_age(mut self, secs: u64) -> Self {
        self.max_age_secs = secs;
        self
    }

    /// Whether `origin` passes this policy
    pub fn is_allowed(&self, origin: &HeaderValue) -> bool {
        if is_localhost_origin(origin) {
            return true;
        }
        origin
            .to_str()
            .map(|o| {
                let o = o.to_ascii_lowercase();
                self.extra_origins.iter().any(|allowed| *allowed == o)
            })
            .unwrap_or(false)
    }
}

/// Build the CORS layer for `config`
pub fn cors_layer(config: CorsConfig) -> CorsLayer {
    let max_age = Duration::from_secs(config.max_age_secs);
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            config.is_allowed(origin)
        }))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .max_age(max_age)
}

/// Checks if the given origin is an http(s) origin on a loopback host.
///
/// ```rust
/// use http::header::HeaderValue;
/// use plin_web::cors::is_localhost_origin;
///
/// assert!(is_localhost_origin(&HeaderValue::from_static("http://localhost:5173")));
/// assert!(!is_localhost_origin(&HeaderValue::from_static("http://localhost.evil.com")));
/// ```
pub fn is_localhost_origin(origin: &HeaderValue) -> bool {
    let Some(url) = origin.to_str().ok().and_then(|s| Url::parse(s).ok()) else {
        return false;
    };

    if !matches!(url.scheme(), "http" | "https") || url.port() == Some(0) {
        return false;
    }

    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
