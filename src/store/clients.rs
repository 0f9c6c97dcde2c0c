//! Client queries

use chrono::Utc;
use tracing::{debug, info, instrument};

use super::models::{validate_email, validate_name, Client, ClientPatch, ClientSummary, ListQuery, NewClient, Page};
use super::{Store, StoreResult};
use crate::error::StoreError;

const CLIENT_COLUMNS: &str = "c.id, c.name, c.email, c.created_by, c.created_at, c.updated_at, c.deleted_at";

const DOCUMENTS_COUNT: &str = "(SELECT COUNT(*) FROM documents d \
     WHERE d.client_id = c.id AND d.deleted_at IS NULL) AS documents_count";

const SEARCH_FILTER: &str = "c.deleted_at IS NULL AND (?1 IS NULL \
     OR LOWER(c.name) LIKE ?1 ESCAPE '\\' OR LOWER(c.email) LIKE ?1 ESCAPE '\\')";

impl Store {
    /// List live clients, newest first, with their document counts.
    ///
    /// The search term matches name or email.
    #[instrument(skip(self, query))]
    pub async fn list_clients(&self, query: &ListQuery) -> StoreResult<Page<ClientSummary>> {
        let pattern = query.like_pattern();

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM clients c WHERE {}",
            SEARCH_FILTER
        ))
        .bind(&pattern)
        .fetch_one(self.pool())
        .await?;

        let rows: Vec<ClientSummary> = sqlx::query_as(&format!(
            "SELECT {}, {} FROM clients c WHERE {} \
             ORDER BY c.created_at DESC, c.id DESC LIMIT ?2 OFFSET ?3",
            CLIENT_COLUMNS, DOCUMENTS_COUNT, SEARCH_FILTER
        ))
        .bind(&pattern)
        .bind(i64::from(query.limit()))
        .bind(query.offset())
        .fetch_all(self.pool())
        .await?;

        Ok(query.page_of(rows, total))
    }

    /// Get a live client by id with its document count
    pub async fn get_client(&self, id: i64) -> StoreResult<ClientSummary> {
        sqlx::query_as(&format!(
            "SELECT {}, {} FROM clients c WHERE c.id = ?1 AND c.deleted_at IS NULL",
            CLIENT_COLUMNS, DOCUMENTS_COUNT
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::NotFound("Client".to_string()))
    }

    /// Live clients
    pub async fn count_clients(&self) -> StoreResult<usize> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients WHERE deleted_at IS NULL")
            .fetch_one(self.pool())
            .await?;
        Ok(usize::try_from(total).unwrap_or_default())
    }

    pub(super) async fn live_client(&self, id: i64) -> StoreResult<Client> {
        sqlx::query_as(&format!(
            "SELECT {} FROM clients c WHERE c.id = ?1 AND c.deleted_at IS NULL",
            CLIENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::NotFound("Client".to_string()))
    }

    async fn client_email_taken(&self, email: &str, except: Option<i64>) -> StoreResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE LOWER(email) = LOWER(?1) \
             AND deleted_at IS NULL AND (?2 IS NULL OR id != ?2))",
        )
        .bind(email)
        .bind(except)
        .fetch_one(self.pool())
        .await?;
        Ok(taken)
    }

    /// Create a client. The email must not belong to another live client.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_client(&self, input: NewClient) -> StoreResult<Client> {
        let name = validate_name(&input.name)?;
        let email = validate_email(&input.email)?;

        if self.client_email_taken(&email, None).await? {
            return Err(StoreError::Conflict("email already in use".to_string()));
        }

        let now = Utc::now();
        let client: Client = sqlx::query_as(
            "INSERT INTO clients (name, email, created_by, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             RETURNING id, name, email, created_by, created_at, updated_at, deleted_at",
        )
        .bind(&name)
        .bind(&email)
        .bind(input.created_by)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        info!("Created client {}", client.id);
        Ok(client)
    }

    /// Update a client's name and/or email
    #[instrument(skip(self, patch))]
    pub async fn update_client(&self, id: i64, patch: ClientPatch) -> StoreResult<Client> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let email = patch.email.as_deref().map(validate_email).transpose()?;

        self.live_client(id).await?;
        if let Some(email) = email.as_deref() {
            if self.client_email_taken(email, Some(id)).await? {
                return Err(StoreError::Conflict("email already in use".to_string()));
            }
        }

        let client: Client = sqlx::query_as(
            "UPDATE clients SET name = COALESCE(?1, name), email = COALESCE(?2, email), \
             updated_at = ?3 WHERE id = ?4 AND deleted_at IS NULL \
             RETURNING id, name, email, created_by, created_at, updated_at, deleted_at",
        )
        .bind(name)
        .bind(email)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::NotFound("Client".to_string()))?;

        debug!("Updated client {}", id);
        Ok(client)
    }

    /// Soft-delete a client. Its documents become invisible.
    #[instrument(skip(self))]
    pub async fn delete_client(&self, id: i64) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE clients SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL")
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Client".to_string()));
        }

        info!("Deleted client {}", id);
        Ok(())
    }
}
