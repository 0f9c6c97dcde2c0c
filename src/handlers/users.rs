//! `/api/users` handlers: login, token refresh and user management
//!
//! Login, refresh and the default admin bootstrap are reachable without a
//! token. Listing and reading users needs any authenticated caller; creating,
//! updating and deleting users needs an administrator.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{ApiError, ApiResponse, ApiResult, AppState, PageResponse};
use crate::auth::{AuthUser, TokenKind, TokenPair, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD};
use crate::error::{AuthError, StoreError};
use crate::store::{validate_password, ListQuery, NewUser, User, UserChanges, UserPatch, UserRole};

/// Body of `POST /api/users/login`
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    /// Login email
    #[serde(default)]
    pub email: Option<String>,
    /// Plain password
    #[serde(default)]
    pub password: Option<String>,
}

/// Body of `POST /api/users/refresh-token`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Refresh token from a previous login
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A user with a freshly issued token pair
#[derive(Debug, Serialize)]
pub struct Session {
    /// The authenticated user
    pub user: User,
    /// Tokens
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// User routes, nested under `/api/users`
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
        .route("/create-default-admin", post(create_default_admin))
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[instrument(skip_all)]
async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<Session>> {
    let Json(request) = payload?;
    let (Some(email), Some(password)) = (required(request.email), required(request.password))
    else {
        return Err(ApiError::bad_request("email and password are required"));
    };

    let credentials = state.store.find_credentials(&email).await?;
    let Some(credentials) = credentials else {
        warn!("Login attempt for unknown email");
        return Err(AuthError::InvalidCredentials.into());
    };

    if !state
        .passwords
        .verify(&password, &credentials.password_hash)
        .await
    {
        warn!("Login attempt with wrong password for user {}", credentials.user.id);
        return Err(AuthError::InvalidCredentials.into());
    }

    let tokens = state.jwt.issue_pair(&credentials.user)?;
    info!("User {} logged in", credentials.user.id);

    Ok(ApiResponse::new(Session {
        user: credentials.user,
        tokens,
    })
    .with_message("Login successful"))
}

#[instrument(skip_all)]
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<Session>> {
    let Json(request) = payload?;
    let token = required(request.refresh_token)
        .ok_or_else(|| ApiError::bad_request("refreshToken is required"))?;

    let claims = state
        .jwt
        .verify(token.trim(), TokenKind::Refresh)
        .map_err(AuthError::from)?;

    let user = match state.store.get_user(claims.id).await {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => return Err(AuthError::UnknownUser.into()),
        Err(e) => return Err(e.into()),
    };

    let tokens = state.jwt.issue_pair(&user)?;
    Ok(ApiResponse::new(Session { user, tokens }).with_message("Token refreshed"))
}

/// Create the default administrator unless it already exists
#[instrument(skip_all)]
async fn create_default_admin(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, ApiResponse<User>)> {
    if let Some(existing) = state.store.find_credentials(DEFAULT_ADMIN_EMAIL).await? {
        return Ok((
            StatusCode::CREATED,
            ApiResponse::new(existing.user).with_message("Default admin user already exists"),
        ));
    }

    let hash = state.passwords.hash(DEFAULT_ADMIN_PASSWORD).await?;
    let user = state
        .store
        .create_user(DEFAULT_ADMIN_EMAIL, &hash, UserRole::Admin)
        .await?;
    warn!(
        "Created default admin {}, change its password before exposing the service",
        DEFAULT_ADMIN_EMAIL
    );

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(user).with_message("Default admin user created"),
    ))
}

#[instrument(skip_all)]
async fn list_users(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<PageResponse<User>> {
    let Query(query) = query?;
    Ok(state.store.list_users(&query).await?.into())
}

#[instrument(skip_all)]
async fn get_user(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ApiResponse<User>> {
    let Path(id) = id?;
    Ok(ApiResponse::new(state.store.get_user(id).await?))
}

#[instrument(skip_all)]
async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, ApiResponse<User>)> {
    caller.require_admin()?;
    let Json(input) = payload?;
    if input.email.trim().is_empty() || input.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let password = validate_password(&input.password)?;
    let hash = state.passwords.hash(&password).await?;
    let user = state
        .store
        .create_user(&input.email, &hash, input.role.unwrap_or_default())
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(user).with_message("User created"),
    ))
}

#[instrument(skip_all)]
async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<ApiResponse<User>> {
    caller.require_admin()?;
    let Path(id) = id?;
    let Json(patch) = payload?;

    let password_hash = match patch.password.as_deref() {
        Some(password) => Some(state.passwords.hash(&validate_password(password)?).await?),
        None => None,
    };

    let user = state
        .store
        .update_user(
            id,
            UserChanges {
                email: patch.email,
                password_hash,
                role: patch.role,
            },
        )
        .await?;
    Ok(ApiResponse::new(user).with_message("User updated"))
}

#[instrument(skip_all)]
async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ApiResponse<()>> {
    caller.require_admin()?;
    let Path(id) = id?;
    state.store.delete_user(id).await?;
    Ok(ApiResponse::message("User deleted"))
}
