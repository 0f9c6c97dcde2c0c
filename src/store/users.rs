//! User queries
//!
//! Passwords arrive here already hashed; the store never sees plain text.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use super::models::{validate_email, ListQuery, Page, User, UserCredentials, UserRole};
use super::{Store, StoreResult};
use crate::error::StoreError;

const USER_COLUMNS: &str = "id, email, role, password_hash, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    role: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_credentials(self) -> StoreResult<UserCredentials> {
        Ok(UserCredentials {
            user: User {
                id: self.id,
                email: self.email,
                role: self.role.parse()?,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            password_hash: self.password_hash,
        })
    }

    fn into_user(self) -> StoreResult<User> {
        self.into_credentials().map(|c| c.user)
    }
}

/// Changes to apply to a user; the password is already hashed
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    /// New email
    pub email: Option<String>,
    /// New bcrypt hash
    pub password_hash: Option<String>,
    /// New role
    pub role: Option<UserRole>,
}

impl Store {
    /// List live users, newest first. The search term matches the email.
    #[instrument(skip(self, query))]
    pub async fn list_users(&self, query: &ListQuery) -> StoreResult<Page<User>> {
        let pattern = query.like_pattern();
        let filter = r"deleted_at IS NULL AND (?1 IS NULL OR LOWER(email) LIKE ?1 ESCAPE '\')";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {}", filter))
            .bind(&pattern)
            .fetch_one(self.pool())
            .await?;

        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            USER_COLUMNS, filter
        ))
        .bind(&pattern)
        .bind(i64::from(query.limit()))
        .bind(query.offset())
        .fetch_all(self.pool())
        .await?;

        let data = rows
            .into_iter()
            .map(UserRow::into_user)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(query.page_of(data, total))
    }

    /// Get a live user by id
    pub async fn get_user(&self, id: i64) -> StoreResult<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = ?1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::NotFound("User".to_string()))?
        .into_user()
    }

    /// Look up a live user and the stored hash by email, case-insensitively
    pub async fn find_credentials(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER(?1) AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(self.pool())
        .await?
        .map(UserRow::into_credentials)
        .transpose()
    }

    async fn user_email_taken(&self, email: &str, except: Option<i64>) -> StoreResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER(?1) \
             AND deleted_at IS NULL AND (?2 IS NULL OR id != ?2))",
        )
        .bind(email)
        .bind(except)
        .fetch_one(self.pool())
        .await?;
        Ok(taken)
    }

    /// Create a user. The email must not belong to another live user.
    #[instrument(skip(self, password_hash))]
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> StoreResult<User> {
        let email = validate_email(email)?;
        if self.user_email_taken(&email, None).await? {
            return Err(StoreError::Conflict("email already in use".to_string()));
        }

        let now = Utc::now();
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (email, password_hash, role, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        let user = row.into_user()?;
        info!("Created {} user {}", user.role, user.id);
        Ok(user)
    }

    /// Apply `changes` to a live user
    #[instrument(skip(self, changes))]
    pub async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<User> {
        let email = changes.email.as_deref().map(validate_email).transpose()?;

        self.get_user(id).await?;
        if let Some(email) = email.as_deref() {
            if self.user_email_taken(email, Some(id)).await? {
                return Err(StoreError::Conflict("email already in use".to_string()));
            }
        }

        let row: UserRow = sqlx::query_as(&format!(
            "UPDATE users SET email = COALESCE(?1, email), \
             password_hash = COALESCE(?2, password_hash), role = COALESCE(?3, role), \
             updated_at = ?4 WHERE id = ?5 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(changes.password_hash)
        .bind(changes.role.map(|r| r.as_str()))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::NotFound("User".to_string()))?;

        debug!("Updated user {}", id);
        row.into_user()
    }

    /// Soft-delete a user. Their clients and documents stay.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE users SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL")
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("User".to_string()));
        }

        info!("Deleted user {}", id);
        Ok(())
    }
}
