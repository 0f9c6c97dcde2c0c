//! HTTP API
//!
//! Routes are grouped per resource, each module exposing `routes()`. The full
//! application is assembled by [`router`], which wraps everything in request
//! tracking, the security middleware and CORS:
//!
//! ```text
//! CORS -> track_requests -> security_middleware -> route / fallback
//! ```
//!
//! Every JSON body carries `success`. Failures are `{"success": false, "error": ...}`.

pub mod clients;
pub mod documents;
pub mod status;
pub mod upload;
pub mod users;
pub mod web;

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::DefaultBodyLimit;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Serialize;
use tracing::{error, warn};

use crate::auth::{AuthConfig, Authenticator, JwtService, PasswordHasher};
use crate::cors::{cors_layer, CorsConfig};
use crate::error::{AuthError, Error, ExtractionError, StoreError};
use crate::fetch::WebScraper;
use crate::security::{security_middleware, SecurityLayer};
use crate::store::{Page, Store};

pub use status::{LatencyMetrics, ServiceMetrics};

/// Default upload limit: 10 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Maximum stored title length in characters
const MAX_TITLE_CHARS: usize = 255;

// ============================================================================
// Application State
// ============================================================================

/// Shared state handed to every handler
#[derive(Debug)]
pub struct AppState {
    /// User, client and document store
    pub store: Store,
    /// Fetch-then-extract pipeline
    pub scraper: WebScraper,
    /// Counters and latency
    pub metrics: ServiceMetrics,
    /// Token issuing and verification
    pub jwt: JwtService,
    /// Password hashing
    pub passwords: PasswordHasher,
    /// Largest accepted PDF upload in bytes
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Create state over an opened store
    pub fn new(store: Store, scraper: WebScraper, auth: &AuthConfig) -> Self {
        Self {
            store,
            scraper,
            metrics: ServiceMetrics::new(),
            jwt: JwtService::new(auth),
            passwords: PasswordHasher::new(auth.password_cost),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Override the upload limit
    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Bearer authenticator sharing this state's keys and store
    pub fn authenticator(&self) -> Authenticator {
        Authenticator::new(self.jwt.clone(), self.store.clone())
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Successful response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`
    pub success: bool,
    /// Payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human-readable outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extraction details for created documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a payload
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            metadata: None,
        }
    }

    /// Attach a message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach extraction metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl ApiResponse<()> {
    /// Response carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            metadata: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Paginated response envelope, page fields flattened next to `success`
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    /// Always `true`
    pub success: bool,
    /// The page
    #[serde(flatten)]
    pub page: Page<T>,
}

impl<T: Serialize> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            success: true,
            page,
        }
    }
}

impl<T: Serialize> IntoResponse for PageResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by handlers, rendered as `{"success": false, "error": ...}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Message shown to the caller
    pub message: String,
}

/// Handler result
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error with an explicit status
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 Unauthorized
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    fn internal(err: &Error) -> Self {
        error!(error = %err, "Internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Extraction(ExtractionError::MalformedInput(_)) => StatusCode::BAD_REQUEST,
            Error::Fetch(_) => StatusCode::BAD_GATEWAY,
            Error::Pdf(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Store(StoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            Error::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Error::Auth(
                AuthError::InvalidCredentials | AuthError::Token(_) | AuthError::UnknownUser,
            ) => StatusCode::UNAUTHORIZED,
            Error::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            // A selector that fails to parse is a bug in our own extraction code
            Error::Extraction(ExtractionError::InvalidSelector(_))
            | Error::Store(StoreError::Database(_))
            | Error::Auth(AuthError::Hashing(_) | AuthError::Signing(_))
            | Error::Io(_)
            | Error::Json(_)
            | Error::Generic(_) => return Self::internal(&err),
        };
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Error::from(err).into()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Error::from(err).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Malformed or mistyped bodies are plain bad requests; keep 413/415
        let status = match rejection.status() {
            StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
            other => other,
        };
        Self::new(status, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        Self::bad_request("Invalid ID format")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), "{}", self.message);
        } else {
            warn!(status = self.status.as_u16(), "{}", self.message);
        }

        let body = Json(serde_json::json!({ "success": false, "error": self.message }));
        (self.status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Build the full application router
pub fn router(state: Arc<AppState>, security: SecurityLayer, cors: CorsConfig) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .merge(status::status_router())
        .nest("/api/users", users::routes())
        .nest("/api/clients", clients::routes())
        .nest("/api/documents", documents::routes())
        .nest("/api/web", web::routes())
        .nest(
            "/api/upload",
            upload::routes().layer(DefaultBodyLimit::max(upload::body_limit(upload_limit))),
        )
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(security, security_middleware))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            status::track_requests,
        ))
        .layer(cors_layer(cors))
        .with_state(state)
}

/// `GET /`: service index
async fn index_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "name": status::SERVER_NAME,
        "version": status::SERVER_VERSION,
        "endpoints": {
            "health": "/health",
            "status": "/status",
            "login": "/api/users/login",
            "refresh": "/api/users/refresh-token",
            "users": "/api/users",
            "clients": "/api/clients",
            "documents": "/api/documents",
            "upload": "/api/upload/pdf",
            "web": "/api/web/scrape",
        },
        "authentication": {
            "header": "Authorization: Bearer <accessToken>",
            "login": "POST /api/users/login",
        },
    }))
}

async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        format!("Route {} not found", uri.path()),
    )
}

/// Clamp an extracted title to the stored maximum
pub(crate) fn document_title(raw: &str) -> String {
    raw.trim().chars().take(MAX_TITLE_CHARS).collect()
}
