//! Record types and input validation for the store

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StoreError;

/// Default page size for listings
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page size a caller may request
pub const MAX_LIMIT: u32 = 100;

/// Smallest accepted password length
pub const MIN_PASSWORD_CHARS: usize = 6;

/// What a user may do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    /// Full access, including user management
    Admin,
    /// Regular account
    #[default]
    User,
}

impl UserRole {
    /// Stored and serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::User => "USER",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(UserRole::Admin),
            "USER" => Ok(UserRole::User),
            other => Err(StoreError::Database(format!("unknown role '{}'", other))),
        }
    }
}

/// An account that can log in. The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier
    pub id: i64,
    /// Login email, unique among live users
    pub email: String,
    /// Role
    pub role: UserRole,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// A user together with the stored password hash, for login only
#[derive(Debug, Clone)]
pub struct UserCredentials {
    /// The user
    pub user: User,
    /// bcrypt hash
    pub password_hash: String,
}

/// Input for creating a user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    /// Login email
    #[serde(default)]
    pub email: String,
    /// Plain password, hashed before it reaches the store
    #[serde(default)]
    pub password: String,
    /// Role, `USER` when omitted
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Partial update for a user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    /// New email
    pub email: Option<String>,
    /// New plain password
    pub password: Option<String>,
    /// New role
    pub role: Option<UserRole>,
}

/// A client owning documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Client {
    /// Identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Contact email, unique among live clients
    pub email: String,
    /// User who created the client
    pub created_by: Option<i64>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A client with the number of live documents attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ClientSummary {
    /// The client
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub client: Client,
    /// Live documents owned by the client
    pub documents_count: i64,
}

/// Where a document came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Uploaded PDF
    #[default]
    Pdf,
    /// Scraped web page
    Url,
}

impl DocumentKind {
    /// Stored and serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Url => "url",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(DocumentKind::Pdf),
            "url" => Ok(DocumentKind::Url),
            other => Err(StoreError::Database(format!(
                "unknown document type '{}'",
                other
            ))),
        }
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier
    pub id: i64,
    /// Title
    pub title: String,
    /// Extracted text
    pub content: String,
    /// Owning client
    pub client_id: i64,
    /// Source kind
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    /// Opaque extraction metadata
    pub metadata: Option<serde_json::Value>,
    /// User who uploaded or scraped the document
    pub uploaded_by: Option<i64>,
    /// When the content was extracted
    pub processed_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A document together with its client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentWithClient {
    /// The document
    #[serde(flatten)]
    pub document: Document,
    /// The owning client
    pub client: Client,
}

/// Input for creating a client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClient {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Contact email
    #[serde(default)]
    pub email: String,
    /// Creating user, taken from the authenticated caller
    #[serde(skip)]
    pub created_by: Option<i64>,
}

/// Partial update for a client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientPatch {
    /// New name
    pub name: Option<String>,
    /// New email
    pub email: Option<String>,
}

/// Input for creating a document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
    /// Title
    #[serde(default)]
    pub title: String,
    /// Content
    #[serde(default)]
    pub content: String,
    /// Owning client
    pub client_id: i64,
    /// Source kind, PDF when omitted
    #[serde(default, rename = "type")]
    pub kind: Option<DocumentKind>,
    /// Opaque metadata
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Processing time, now when omitted
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    /// Uploading user, taken from the authenticated caller
    #[serde(skip)]
    pub uploaded_by: Option<i64>,
}

/// Partial update for a document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPatch {
    /// New title
    pub title: Option<String>,
    /// New content
    pub content: Option<String>,
    /// New processing time
    pub processed_at: Option<DateTime<Utc>>,
}

/// Pagination and search parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// 1-based page number
    pub page: Option<u32>,
    /// Page size
    pub limit: Option<u32>,
    /// Case-insensitive substring filter
    pub search: Option<String>,
}

impl ListQuery {
    /// Page number, at least 1
    pub fn page(&self) -> u32 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    /// Page size, clamped to `1..=MAX_LIMIT`
    pub fn limit(&self) -> u32 {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT)
    }

    /// Lower-cased search term, if any
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Search term as a `LIKE ... ESCAPE '\'` substring pattern
    pub fn like_pattern(&self) -> Option<String> {
        self.search_term().map(|term| {
            let mut pattern = String::with_capacity(term.len() + 2);
            pattern.push('%');
            for c in term.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
            pattern.push('%');
            pattern
        })
    }

    /// Rows to skip for the requested page
    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }

    /// Assemble a page from the fetched rows and the total match count
    pub fn page_of<T>(&self, data: Vec<T>, total: i64) -> Page<T> {
        let limit = self.limit() as usize;
        let total = usize::try_from(total).unwrap_or_default();

        Page {
            count: data.len(),
            total,
            total_pages: total.div_ceil(limit),
            current_page: self.page(),
            data,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows in this page
    pub data: Vec<T>,
    /// Number of rows in this page
    pub count: usize,
    /// Number of rows across all pages
    pub total: usize,
    /// Number of pages
    pub total_pages: usize,
    /// Page that was returned
    pub current_page: u32,
}

/// Validate and normalize a client name
pub fn validate_name(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    match name.chars().count() {
        0 => Err(StoreError::Validation("name is required".to_string())),
        1 => Err(StoreError::Validation(
            "name must be between 2 and 255 characters".to_string(),
        )),
        n if n > 255 => Err(StoreError::Validation(
            "name must be between 2 and 255 characters".to_string(),
        )),
        _ => Ok(name.to_string()),
    }
}

/// Validate and normalize an email address
pub fn validate_email(email: &str) -> Result<String, StoreError> {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

    let email = email.trim();
    if email.is_empty() {
        return Err(StoreError::Validation("email is required".to_string()));
    }

    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    });
    if email.len() > 255 || !re.is_match(email) {
        return Err(StoreError::Validation(format!(
            "'{}' is not a valid email address",
            email
        )));
    }

    Ok(email.to_string())
}

/// Validate a plain password before hashing
pub fn validate_password(password: &str) -> Result<String, StoreError> {
    match password.chars().count() {
        0 => Err(StoreError::Validation("password is required".to_string())),
        n if n < MIN_PASSWORD_CHARS => Err(StoreError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_CHARS
        ))),
        n if n > 255 => Err(StoreError::Validation(
            "password must be at most 255 characters".to_string(),
        )),
        _ => Ok(password.to_string()),
    }
}

/// Validate and normalize a document title
pub fn validate_title(title: &str) -> Result<String, StoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::Validation("title is required".to_string()));
    }
    if title.chars().count() > 255 {
        return Err(StoreError::Validation(
            "title must be at most 255 characters".to_string(),
        ));
    }
    Ok(title.to_string())
}

/// Validate document content
pub fn validate_content(content: &str) -> Result<String, StoreError> {
    if content.trim().is_empty() {
        return Err(StoreError::Validation("content is required".to_string()));
    }
    Ok(content.to_string())
}
