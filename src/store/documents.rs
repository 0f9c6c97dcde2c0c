//! Document queries
//!
//! A document is visible while neither it nor its client is deleted. Every
//! read joins the owning client and filters on both `deleted_at` columns.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use super::models::{
    validate_content, validate_title, Client, Document, DocumentKind, DocumentPatch,
    DocumentWithClient, ListQuery, NewDocument, Page,
};
use super::{Store, StoreResult};
use crate::error::StoreError;

const DOCUMENT_COLUMNS: &str = "d.id, d.title, d.content, d.client_id, d.type AS kind, \
     d.metadata, d.uploaded_by, d.processed_at, d.created_at, d.updated_at, d.deleted_at, \
     c.name AS client_name, c.email AS client_email, c.created_by AS client_created_by, \
     c.created_at AS client_created_at, c.updated_at AS client_updated_at";

const VISIBLE: &str = "FROM documents d JOIN clients c ON c.id = d.client_id \
     WHERE d.deleted_at IS NULL AND c.deleted_at IS NULL";

/// `?1` search pattern, `?2` client id, `?3` uploader id; NULL disables each
const LIST_FILTER: &str = "(?1 IS NULL OR LOWER(d.title) LIKE ?1 ESCAPE '\\' \
     OR LOWER(d.content) LIKE ?1 ESCAPE '\\') \
     AND (?2 IS NULL OR d.client_id = ?2) AND (?3 IS NULL OR d.uploaded_by = ?3)";

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: i64,
    title: String,
    content: String,
    client_id: i64,
    kind: String,
    metadata: Option<String>,
    uploaded_by: Option<i64>,
    processed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    client_name: String,
    client_email: String,
    client_created_by: Option<i64>,
    client_created_at: DateTime<Utc>,
    client_updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_document_with_client(self) -> StoreResult<DocumentWithClient> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Database(format!("Invalid metadata JSON: {}", e)))?;

        Ok(DocumentWithClient {
            document: Document {
                id: self.id,
                title: self.title,
                content: self.content,
                client_id: self.client_id,
                kind: self.kind.parse()?,
                metadata,
                uploaded_by: self.uploaded_by,
                processed_at: self.processed_at,
                created_at: self.created_at,
                updated_at: self.updated_at,
                deleted_at: self.deleted_at,
            },
            client: Client {
                id: self.client_id,
                name: self.client_name,
                email: self.client_email,
                created_by: self.client_created_by,
                created_at: self.client_created_at,
                updated_at: self.client_updated_at,
                deleted_at: None,
            },
        })
    }
}

/// Which documents a listing covers
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    client_id: Option<i64>,
    uploaded_by: Option<i64>,
}

impl Store {
    async fn visible_documents(
        &self,
        scope: Scope,
        query: &ListQuery,
    ) -> StoreResult<Page<DocumentWithClient>> {
        let pattern = query.like_pattern();

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {} AND {}", VISIBLE, LIST_FILTER))
            .bind(&pattern)
            .bind(scope.client_id)
            .bind(scope.uploaded_by)
            .fetch_one(self.pool())
            .await?;

        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {} {} AND {} ORDER BY d.processed_at DESC, d.id DESC LIMIT ?4 OFFSET ?5",
            DOCUMENT_COLUMNS, VISIBLE, LIST_FILTER
        ))
        .bind(&pattern)
        .bind(scope.client_id)
        .bind(scope.uploaded_by)
        .bind(i64::from(query.limit()))
        .bind(query.offset())
        .fetch_all(self.pool())
        .await?;

        let data = rows
            .into_iter()
            .map(DocumentRow::into_document_with_client)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(query.page_of(data, total))
    }

    /// List visible documents, most recently processed first.
    ///
    /// The search term matches title or content.
    #[instrument(skip(self, query))]
    pub async fn list_documents(&self, query: &ListQuery) -> StoreResult<Page<DocumentWithClient>> {
        self.visible_documents(Scope::default(), query).await
    }

    /// List the visible documents of one live client
    #[instrument(skip(self, query))]
    pub async fn list_documents_by_client(
        &self,
        client_id: i64,
        query: &ListQuery,
    ) -> StoreResult<Page<DocumentWithClient>> {
        self.live_client(client_id).await?;
        let scope = Scope {
            client_id: Some(client_id),
            ..Default::default()
        };
        self.visible_documents(scope, query).await
    }

    /// List the visible documents uploaded by one live user
    #[instrument(skip(self, query))]
    pub async fn list_documents_by_user(
        &self,
        user_id: i64,
        query: &ListQuery,
    ) -> StoreResult<Page<DocumentWithClient>> {
        self.get_user(user_id).await?;
        let scope = Scope {
            uploaded_by: Some(user_id),
            ..Default::default()
        };
        self.visible_documents(scope, query).await
    }

    /// Get a visible document with its client
    pub async fn get_document(&self, id: i64) -> StoreResult<DocumentWithClient> {
        let row: DocumentRow =
            sqlx::query_as(&format!("SELECT {} {} AND d.id = ?1", DOCUMENT_COLUMNS, VISIBLE))
                .bind(id)
                .fetch_optional(self.pool())
                .await?
                .ok_or_else(|| StoreError::NotFound("Document".to_string()))?;
        row.into_document_with_client()
    }

    /// Visible documents
    pub async fn count_documents(&self) -> StoreResult<usize> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {}", VISIBLE))
            .fetch_one(self.pool())
            .await?;
        Ok(usize::try_from(total).unwrap_or_default())
    }

    /// Create a document for a live client
    #[instrument(skip(self, input), fields(client_id = input.client_id))]
    pub async fn create_document(&self, input: NewDocument) -> StoreResult<DocumentWithClient> {
        let title = validate_title(&input.title)?;
        let content = validate_content(&input.content)?;
        let client = self.live_client(input.client_id).await?;

        let kind = input.kind.unwrap_or_default();
        let metadata = input.metadata.as_ref().map(serde_json::Value::to_string);
        let now = Utc::now();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO documents \
             (title, content, client_id, type, metadata, uploaded_by, processed_at, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) RETURNING id",
        )
        .bind(&title)
        .bind(&content)
        .bind(client.id)
        .bind(kind.as_str())
        .bind(metadata)
        .bind(input.uploaded_by)
        .bind(input.processed_at.unwrap_or(now))
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        info!(
            "Created {:?} document {} for client {}",
            kind, id, client.id
        );
        self.get_document(id).await
    }

    /// Update a document's title, content or processing time
    #[instrument(skip(self, patch))]
    pub async fn update_document(
        &self,
        id: i64,
        patch: DocumentPatch,
    ) -> StoreResult<DocumentWithClient> {
        let title = patch.title.as_deref().map(validate_title).transpose()?;
        let content = patch.content.as_deref().map(validate_content).transpose()?;

        let result = sqlx::query(
            "UPDATE documents SET title = COALESCE(?1, title), content = COALESCE(?2, content), \
             processed_at = COALESCE(?3, processed_at), updated_at = ?4 \
             WHERE id = ?5 AND deleted_at IS NULL \
             AND client_id IN (SELECT id FROM clients WHERE deleted_at IS NULL)",
        )
        .bind(title)
        .bind(content)
        .bind(patch.processed_at)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Document".to_string()));
        }

        debug!("Updated document {}", id);
        self.get_document(id).await
    }

    /// Soft-delete a document
    #[instrument(skip(self))]
    pub async fn delete_document(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL \
             AND client_id IN (SELECT id FROM clients WHERE deleted_at IS NULL)",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Document".to_string()));
        }

        info!("Deleted document {}", id);
        Ok(())
    }
}
