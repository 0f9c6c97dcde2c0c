//! SQLite-backed user, client and document store
//!
//! Clients own documents; users own neither but are recorded as the creator
//! of clients and the uploader of documents. Every kind of record is
//! soft-deleted: a deleted row keeps its data but disappears from every read.
//! Documents of a deleted client are hidden as well, even though they are not
//! deleted themselves.
//!
//! Listings are paginated through [`ListQuery`] with `LIMIT`/`OFFSET` and a
//! `COUNT(*)` over the same filter, and searched with a case-insensitive
//! substring match.
//!
//! # Example URLs
//!
//! - `sqlite::memory:` - in-memory database, gone when the pool closes
//! - `sqlite://plin-web.db` - file database, created if missing

mod clients;
mod documents;
pub mod models;
mod users;

pub use models::{
    validate_content, validate_email, validate_name, validate_password, validate_title, Client,
    ClientPatch, ClientSummary, Document, DocumentKind, DocumentPatch, DocumentWithClient,
    ListQuery, NewClient, NewDocument, NewUser, Page, User, UserCredentials, UserPatch, UserRole,
    DEFAULT_LIMIT, MAX_LIMIT, MIN_PASSWORD_CHARS,
};
pub use users::UserChanges;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::StoreError;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Default database location for the binary
pub const DEFAULT_DATABASE_URL: &str = "sqlite://plin-web.db";

/// Pool size for file databases
const MAX_CONNECTIONS: u32 = 5;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'USER' CHECK (role IN ('ADMIN', 'USER')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_live_email
    ON users(LOWER(email)) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_clients_live_email
    ON clients(LOWER(email)) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_clients_created_at ON clients(created_at);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    client_id INTEGER NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    type TEXT NOT NULL DEFAULT 'pdf' CHECK (type IN ('pdf', 'url')),
    metadata TEXT,
    uploaded_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    processed_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_client_id ON documents(client_id);
CREATE INDEX IF NOT EXISTS idx_documents_uploaded_by ON documents(uploaded_by);
CREATE INDEX IF NOT EXISTS idx_documents_processed_at ON documents(processed_at);
"#;

/// Store for users, clients and documents over a SQLite pool.
///
/// Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `database_url` and apply the schema
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to database {}", database_url);
        Ok(store)
    }

    /// Fresh in-memory database.
    ///
    /// Every SQLite in-memory connection is its own database, so the pool is
    /// pinned to one connection that is never recycled.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create missing tables and indexes
    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        debug!("Database schema is up to date");
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
