//! Plin Web - Document Management API with Web and PDF Content Extraction
//!
//! This crate provides a REST service that stores documents for clients. A
//! document is created from an uploaded PDF or by scraping a web page; in
//! both cases the text is extracted server-side. Users log in with email and
//! password and are recorded as the creator of clients and the uploader of
//! documents.
//!
//! # Features
//!
//! - **Content Extraction**: Ranked main-content selection, text normalization
//!   and metadata extraction from raw HTML
//! - **Page Fetching**: HTTP fetch with timeout, browser user agent and typed failures
//! - **PDF Extraction**: Page text and document info via `lopdf`
//! - **Store**: SQLite-backed users, clients and documents with soft delete,
//!   pagination and search
//! - **Auth**: bcrypt passwords, JWT access and refresh tokens, admin role
//! - **HTTP API**: axum router with JWT bearer auth, rate limiting and CORS
//!
//! # Architecture
//!
//! ```text
//! Client ──▶ HTTP API ──▶ WebScraper ──▶ PageFetcher ──▶ ContentExtractor
//!               │                                              │
//!               ├──────▶ PdfExtractor                          │
//!               ▼                                              ▼
//!             Store ◀──────────── title, body, metadata ───────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use plin_web::extraction::ContentExtractor;
//!
//! let html = "<html><head><title>Hello</title></head><body><p>World</p></body></html>";
//! let result = ContentExtractor::extract(html, "https://example.com/").unwrap();
//!
//! assert_eq!(result.title, "Hello");
//! assert_eq!(result.body, "World");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod cors;
pub mod error;
pub mod extraction;
pub mod fetch;
pub mod handlers;
pub mod pdf;
pub mod security;
pub mod store;

// Re-exports for convenience
pub use auth::{AuthConfig, AuthUser, Authenticator, JwtService, PasswordHasher};
pub use error::{Error, Result};
pub use extraction::{ContentExtractor, ExtractionResult, LinkExtractor, Metadata, MetadataExtractor};
pub use fetch::{FetchOptions, PageFetcher, WebScraper};
pub use handlers::{router, AppState};
pub use pdf::PdfExtractor;
pub use security::{SecurityConfig, SecurityLayer};
pub use store::Store;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
