//! Status and health check handlers.
//!
//! - `/health` - liveness check
//! - `/ready` - readiness check
//! - `/status` - runtime counters, record totals and latency percentiles
//!
//! ```text
//! HTTP Request ──> track_requests ──> handler ──> AppState
//!                        │                           │
//!                        ▼                           ▼
//!               LatencyHistogram            ServiceMetrics + Store
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{ApiResult, AppState};

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Health check response for liveness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

/// Detailed server status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server version
    pub version: String,
    /// Server name
    pub name: String,
    /// Always "running" if responding
    pub status: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Web pages scraped and stored
    pub pages_scraped: u64,
    /// PDFs extracted and stored
    pub pdfs_processed: u64,
    /// Responses with a 4xx or 5xx status
    pub errors: u64,
    /// Live clients
    pub clients: usize,
    /// Visible documents
    pub documents: usize,
    /// Request latency statistics
    pub latency: LatencyMetrics,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

/// Request latency percentiles in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// Median latency
    pub p50_ms: f64,
    /// 95th percentile latency
    pub p95_ms: f64,
    /// 99th percentile latency
    pub p99_ms: f64,
    /// Number of requests recorded
    pub total_requests: u64,
    /// Mean latency
    pub mean_ms: f64,
    /// Maximum latency
    pub max_ms: f64,
}

// ============================================================================
// Latency Histogram
// ============================================================================

/// Thread-safe latency histogram, 1 microsecond to 60 seconds with
/// 3 significant figures.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("histogram bounds are valid");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a duration. Values outside the bounds are saturated.
    pub fn record(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.inner.write().saturating_record(micros.max(1));
    }

    /// Number of recorded values
    pub fn count(&self) -> u64 {
        self.inner.read().len()
    }

    /// Percentiles converted to milliseconds
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        if hist.is_empty() {
            return LatencyMetrics::default();
        }
        LatencyMetrics {
            p50_ms: hist.value_at_quantile(0.50) as f64 / 1000.0,
            p95_ms: hist.value_at_quantile(0.95) as f64 / 1000.0,
            p99_ms: hist.value_at_quantile(0.99) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Service Metrics
// ============================================================================

/// Counters and latency for the running service. All fields are lock-free
/// atomics except the histogram.
#[derive(Debug)]
pub struct ServiceMetrics {
    start_time: Instant,
    pages_scraped: AtomicU64,
    pdfs_processed: AtomicU64,
    error_count: AtomicU64,
    latency: LatencyHistogram,
}

impl ServiceMetrics {
    /// Create metrics with the clock starting now
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            pages_scraped: AtomicU64::new(0),
            pdfs_processed: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
        }
    }

    /// Seconds since startup
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Count a stored web page
    #[inline]
    pub fn record_page_scraped(&self) -> u64 {
        self.pages_scraped.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Web pages scraped so far
    #[inline]
    pub fn pages_scraped(&self) -> u64 {
        self.pages_scraped.load(Ordering::Relaxed)
    }

    /// Count a stored PDF
    #[inline]
    pub fn record_pdf_processed(&self) -> u64 {
        self.pdfs_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// PDFs processed so far
    #[inline]
    pub fn pdfs_processed(&self) -> u64 {
        self.pdfs_processed.load(Ordering::Relaxed)
    }

    /// Count an error response
    #[inline]
    pub fn record_error(&self) -> u64 {
        self.error_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Error responses so far
    #[inline]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Record a request duration
    #[inline]
    pub fn record_latency(&self, duration: Duration) {
        self.latency.record(duration);
    }

    /// Latency percentiles
    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency.metrics()
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware recording latency and error responses for every request
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    state.metrics.record_latency(elapsed);
    if response.status().is_client_error() || response.status().is_server_error() {
        state.metrics.record_error();
    }

    debug!(
        "{} {} -> {} in {:?}",
        method,
        path,
        response.status().as_u16(),
        elapsed
    );
    response
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// `GET /health`: always 200 while the process is serving
#[instrument(skip_all)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            uptime_seconds: state.metrics.uptime_seconds(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// `GET /ready`: 200 once the database answers, 503 otherwise
#[instrument(skip_all)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Readiness check requested");
    let (status, label) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            uptime_seconds: state.metrics.uptime_seconds(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// `GET /status`: counters, record totals and latency percentiles
#[instrument(skip_all)]
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<StatusResponse>)> {
    debug!("Status check requested");

    let clients = state.store.count_clients().await?;
    let documents = state.store.count_documents().await?;

    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        status: "running".to_string(),
        uptime_seconds: state.metrics.uptime_seconds(),
        pages_scraped: state.metrics.pages_scraped(),
        pdfs_processed: state.metrics.pdfs_processed(),
        errors: state.metrics.error_count(),
        clients,
        documents,
        latency: state.metrics.latency_metrics(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Routes for `/health`, `/ready` and `/status`
pub fn status_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        .route("/status", get(status_handler))
}

// ============================================================================
// Tests
// ============================================================================
