//! Error types for Plin Web
//!
//! This module provides the error hierarchy used across the crate, built with
//! `thiserror`. Each subsystem (extraction, fetching, PDF parsing, storage,
//! authentication) owns its own enum and converts into the crate-level [`Error`].

use thiserror::Error;

/// The main error type for Plin Web operations
#[derive(Error, Debug)]
pub enum Error {
    /// Content extraction errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Page fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// PDF parsing errors
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Storage errors (not found, validation, conflicts, database)
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Authentication errors
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Content extraction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The source URL is not a valid absolute URL
    #[error("Malformed source URL: {0}")]
    MalformedInput(String),

    /// A CSS selector failed to compile
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// Category of a failed page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The request did not complete before the timeout
    Timeout,
    /// The server answered 404
    NotFound,
    /// The server answered 403
    Forbidden,
    /// Any other non-success status
    Http,
    /// The connection could not be established
    Connection,
    /// The request could not be built or sent
    Request,
    /// The response body could not be read or decoded
    Body,
}

/// A page fetch failure, distinguishable by kind and optional HTTP status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    /// What went wrong
    pub kind: FetchErrorKind,
    /// HTTP status, when the server answered
    pub status: Option<u16>,
    /// Human-readable reason
    pub message: String,
}

impl FetchError {
    /// Create a fetch error without an HTTP status
    pub fn new<S: Into<String>>(kind: FetchErrorKind, message: S) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Create a fetch error from a non-success HTTP status
    pub fn from_status(status: u16, reason: &str) -> Self {
        let (kind, message) = match status {
            404 => (FetchErrorKind::NotFound, "Page not found (404)".to_string()),
            403 => (FetchErrorKind::Forbidden, "Access denied (403)".to_string()),
            _ => (FetchErrorKind::Http, format!("HTTP error {}: {}", status, reason)),
        };
        Self {
            kind,
            status: Some(status),
            message,
        }
    }
}

/// PDF processing errors
#[derive(Error, Debug)]
pub enum PdfError {
    /// The bytes could not be parsed as a PDF document
    #[error("Failed to load PDF: {0}")]
    LoadFailed(String),

    /// Text extraction failed on a page
    #[error("Failed to extract text from page {page}: {message}")]
    ExtractionFailed {
        /// Page number (1-based)
        page: u32,
        /// Underlying error message
        message: String,
    },
}

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist or was deleted
    #[error("{0} not found")]
    NotFound(String),

    /// The input failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The input conflicts with an existing record
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The database rejected or failed the query
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // Unique indexes only exist on live emails
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict("email already in use".to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound("Record".to_string()),
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Bearer token failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// The token was valid once but its `exp` has passed
    #[error("Token expired")]
    Expired,

    /// Bad signature, malformed token or wrong token kind
    #[error("Invalid token")]
    Invalid,
}

/// Authentication errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown email or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The presented token was rejected
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The token belongs to a user that no longer exists
    #[error("User not found")]
    UnknownUser,

    /// The caller lacks the required role
    #[error("Access denied: administrator role required")]
    Forbidden,

    /// Password hashing failed
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Token signing failed
    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Result type alias for Plin Web operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }
}
