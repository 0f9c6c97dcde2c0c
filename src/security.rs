//! Security middleware for the Plin Web API
//!
//! Every request passes through the same checks before it reaches a handler:
//!
//! ```text
//! Request -> IP Filter -> Rate Limiter -> Bearer Auth -> Handler -> Security Headers
//! ```
//!
//! Bearer tokens are resolved to users by [`Authenticator`]; the caller is
//! attached to the request as an [`AuthUser`] extension.
//!
//! # Configuration
//!
//! Network settings come from environment variables:
//!
//! - `PLIN_WEB_BIND_ALL`: Set to "true" to bind 0.0.0.0 and accept remote clients
//! - `PLIN_WEB_RATE_LIMIT`: Requests per minute per IP (default: 100)
//!
//! Remote clients are accepted whenever the listener is bound to anything
//! other than a loopback address, see [`SecurityLayer::bound_to`].
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{middleware, Router};
//! use plin_web::auth::{AuthConfig, Authenticator, JwtService};
//! use plin_web::security::{security_middleware, SecurityConfig, SecurityLayer};
//! use plin_web::store::Store;
//!
//! # async fn build() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::in_memory().await?;
//! let jwt = JwtService::new(&AuthConfig::from_env()?);
//! let layer = SecurityLayer::new(SecurityConfig::from_env()?, Authenticator::new(jwt, store));
//! let app: Router = Router::new()
//!     // ... routes
//!     .layer(middleware::from_fn_with_state(layer, security_middleware));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::{AuthResult, AuthUser, Authenticator};

/// Environment variable enabling binding on all interfaces
pub const BIND_ALL_ENV: &str = "PLIN_WEB_BIND_ALL";

/// Environment variable holding the per-IP rate limit
pub const RATE_LIMIT_ENV: &str = "PLIN_WEB_RATE_LIMIT";

/// Default requests per minute per IP
pub const DEFAULT_RATE_LIMIT_RPM: u32 = 100;

/// Paths reachable without a bearer token
pub const AUTH_BYPASS_PATHS: &[&str] = &[
    "/",
    "/health",
    "/status",
    "/ready",
    "/api/users/login",
    "/api/users/refresh-token",
    "/api/users/create-default-admin",
];

/// Security-related error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// Invalid rate limit configuration
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),
}

/// Result type for security operations
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

// =============================================================================
// Security Configuration
// =============================================================================

/// Network security configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Whether to bind to all interfaces and accept remote clients
    pub bind_all: bool,

    /// Bind address derived from `bind_all`
    pub bind_addr: IpAddr,

    /// Rate limit: requests per minute per IP
    pub rate_limit_rpm: u32,

    /// Paths that bypass authentication. `/` only matches exactly,
    /// the others also match their sub-paths.
    pub auth_bypass_paths: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bind_all: false,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            rate_limit_rpm: DEFAULT_RATE_LIMIT_RPM,
            auth_bypass_paths: AUTH_BYPASS_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SecurityConfig {
    /// Load the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::InvalidRateLimit` if `PLIN_WEB_RATE_LIMIT` is not
    /// a positive integer.
    pub fn from_env() -> SecurityResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> SecurityResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.bind_all = lookup(BIND_ALL_ENV)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        config.bind_addr = if config.bind_all {
            warn!("SECURITY: Binding to 0.0.0.0 ({}=true)", BIND_ALL_ENV);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            info!("SECURITY: Binding to localhost only (127.0.0.1)");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };

        if let Some(raw) = lookup(RATE_LIMIT_ENV) {
            config.rate_limit_rpm = raw
                .trim()
                .parse::<u32>()
                .map_err(|e| SecurityError::InvalidRateLimit(e.to_string()))?;
        }

        if config.rate_limit_rpm == 0 {
            return Err(SecurityError::InvalidRateLimit(
                "Rate limit cannot be 0".to_string(),
            ));
        }

        info!(
            "SECURITY: Rate limit set to {} requests/minute per IP",
            config.rate_limit_rpm
        );

        Ok(config)
    }

    /// Get the socket address for binding
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_addr, port)
    }

    /// Check if a path bypasses authentication
    pub fn is_auth_bypass_path(&self, path: &str) -> bool {
        self.auth_bypass_paths.iter().any(|p| {
            if p == "/" {
                path == "/"
            } else {
                path == p || path.starts_with(&format!("{}/", p))
            }
        })
    }
}

// =============================================================================
// Rate Limiter
// =============================================================================

/// Per-IP fixed-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: RwLock<HashMap<IpAddr, RateBucket>>,
}

#[derive(Debug, Clone)]
struct RateBucket {
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_minute` per IP
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, Duration::from_secs(60))
    }

    /// Create a limiter with a custom window
    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Count a request from `ip` and report whether it is allowed
    pub async fn check(&self, ip: IpAddr) -> RateLimitResult {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();

        let bucket = buckets.entry(ip).or_insert_with(|| RateBucket {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        bucket.count += 1;

        if bucket.count > self.max_requests {
            RateLimitResult::Exceeded {
                retry_after: self
                    .window
                    .saturating_sub(now.duration_since(bucket.window_start)),
                limit: self.max_requests,
            }
        } else {
            RateLimitResult::Allowed {
                remaining: self.max_requests - bucket.count,
                limit: self.max_requests,
            }
        }
    }

    /// Drop buckets idle for more than two windows
    pub async fn cleanup(&self) -> usize {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        let window = self.window;
        let before = buckets.len();

        buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window * 2);
        before - buckets.len()
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in window
        remaining: u32,
        /// Total limit
        limit: u32,
    },
    /// Rate limit exceeded
    Exceeded {
        /// Time until the window resets
        retry_after: Duration,
        /// Total limit
        limit: u32,
    },
}

impl RateLimitResult {
    /// Check if the request is allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    /// Rate limit headers for this result
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            RateLimitResult::Allowed { remaining, limit } => vec![
                ("x-ratelimit-limit", limit.to_string()),
                ("x-ratelimit-remaining", remaining.to_string()),
            ],
            RateLimitResult::Exceeded { retry_after, limit } => vec![
                ("x-ratelimit-limit", limit.to_string()),
                ("x-ratelimit-remaining", "0".to_string()),
                ("retry-after", retry_after.as_secs().to_string()),
            ],
        }
    }
}

// =============================================================================
// IP Filter
// =============================================================================

/// Loopback-only filter, disabled when the listener accepts remote clients
#[derive(Debug, Clone, Copy, Default)]
pub struct IpFilter {
    allow_all: bool,
}

impl IpFilter {
    /// Create a new IP filter
    pub fn new(allow_all: bool) -> Self {
        Self { allow_all }
    }

    /// Filter matching a listener bound to `ip`: a loopback listener only
    /// admits loopback peers, any other address admits everyone it can reach.
    pub fn for_bind_addr(ip: IpAddr) -> Self {
        Self::new(!ip.is_loopback())
    }

    /// Check if an IP is allowed
    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        self.allow_all || ip.is_loopback()
    }
}

// =============================================================================
// Security Headers
// =============================================================================

/// Headers applied to every response
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
    ("x-xss-protection", "0"),
    ("referrer-policy", "no-referrer"),
    ("cache-control", "no-store"),
];

fn apply_headers<'a, I>(headers: &mut HeaderMap, pairs: I)
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
}

// =============================================================================
// Security Layer
// =============================================================================

/// Outcome of running a request through the security checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityCheckResult {
    /// Request may proceed; headers go on the response
    Allowed {
        /// Headers to add to the response
        headers: Vec<(&'static str, String)>,
        /// The caller, unless the path bypasses authentication
        user: Option<AuthUser>,
    },
    /// Request is rejected
    Rejected {
        /// HTTP status code
        status: StatusCode,
        /// Error message
        message: String,
        /// Headers to add to the response
        headers: Vec<(&'static str, String)>,
    },
}

impl SecurityCheckResult {
    /// Check if the request is allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, SecurityCheckResult::Allowed { .. })
    }

    /// HTTP status of the outcome
    pub fn status_code(&self) -> StatusCode {
        match self {
            SecurityCheckResult::Allowed { .. } => StatusCode::OK,
            SecurityCheckResult::Rejected { status, .. } => *status,
        }
    }
}

/// Shared security state: configuration, rate limiter and authenticator
#[derive(Debug, Clone)]
pub struct SecurityLayer {
    config: Arc<SecurityConfig>,
    rate_limiter: Arc<RateLimiter>,
    ip_filter: IpFilter,
    authenticator: Authenticator,
}

impl SecurityLayer {
    /// Create a new security layer from configuration.
    ///
    /// The IP filter follows `config.bind_addr` until [`Self::bound_to`]
    /// says otherwise.
    pub fn new(config: SecurityConfig, authenticator: Authenticator) -> Self {
        let config = Arc::new(config);

        Self {
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_rpm)),
            ip_filter: IpFilter::for_bind_addr(config.bind_addr),
            authenticator,
            config,
        }
    }

    /// Match the IP filter to the address the listener is actually bound to
    pub fn bound_to(mut self, ip: IpAddr) -> Self {
        self.ip_filter = IpFilter::for_bind_addr(ip);
        if !ip.is_loopback() {
            warn!("SECURITY: Listening on {}, accepting remote clients", ip);
        }
        self
    }

    /// The configuration this layer enforces
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Drop idle rate limiter buckets
    pub async fn cleanup_rate_limiter(&self) -> usize {
        self.rate_limiter.cleanup().await
    }

    /// Run a request through the IP filter, rate limiter and authenticator
    pub async fn check(
        &self,
        remote_ip: IpAddr,
        path: &str,
        auth_header: Option<&str>,
    ) -> SecurityCheckResult {
        if !self.ip_filter.is_allowed(remote_ip) {
            warn!("Rejected request from non-localhost IP: {}", remote_ip);
            return SecurityCheckResult::Rejected {
                status: StatusCode::FORBIDDEN,
                message: "Forbidden: Only localhost connections allowed".to_string(),
                headers: Vec::new(),
            };
        }

        let rate = self.rate_limiter.check(remote_ip).await;
        if let RateLimitResult::Exceeded { retry_after, .. } = &rate {
            warn!("Rate limit exceeded for IP: {}", remote_ip);
            return SecurityCheckResult::Rejected {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: format!(
                    "Too Many Requests. Retry after {} seconds.",
                    retry_after.as_secs()
                ),
                headers: rate.headers(),
            };
        }

        let auth = if self.config.is_auth_bypass_path(path) {
            debug!("Auth bypass for path: {}", path);
            AuthResult::Bypassed
        } else {
            self.authenticator.authenticate(auth_header).await
        };

        match auth {
            AuthResult::Authenticated(user) => SecurityCheckResult::Allowed {
                headers: rate.headers(),
                user: Some(user),
            },
            AuthResult::Bypassed => SecurityCheckResult::Allowed {
                headers: rate.headers(),
                user: None,
            },
            AuthResult::Unavailable => SecurityCheckResult::Rejected {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Internal server error".to_string(),
                headers: rate.headers(),
            },
            failed => {
                warn!("Authentication failed for path {}: {:?}", path, failed);
                let mut headers = rate.headers();
                headers.push(("www-authenticate", "Bearer".to_string()));
                SecurityCheckResult::Rejected {
                    status: StatusCode::UNAUTHORIZED,
                    message: failed.error_message().unwrap_or_default(),
                    headers,
                }
            }
        }
    }
}

/// axum middleware enforcing [`SecurityLayer`] on every request.
///
/// Requests without connection info (e.g. in-process router tests) are
/// treated as coming from localhost.
pub async fn security_middleware(
    State(layer): State<SecurityLayer>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let remote_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let path = request.uri().path().to_string();

    let outcome = layer
        .check(remote_ip, &path, auth_header.as_deref())
        .await;

    let (mut response, extra) = match outcome {
        SecurityCheckResult::Allowed { headers, user } => {
            if let Some(user) = user {
                request.extensions_mut().insert(user);
            }
            (next.run(request).await, headers)
        }
        SecurityCheckResult::Rejected {
            status,
            message,
            headers,
        } => {
            let body = Json(serde_json::json!({ "success": false, "error": message }));
            ((status, body).into_response(), headers)
        }
    };

    let response_headers = response.headers_mut();
    apply_headers(
        response_headers,
        SECURITY_HEADERS.iter().map(|(k, v)| (*k, v.to_string())),
    );
    apply_headers(response_headers, extra);
    response
}

// =============================================================================
// Tests
// =============================================================================
