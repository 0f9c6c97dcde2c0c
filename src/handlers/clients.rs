//! `/api/clients` handlers

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use tracing::instrument;

use super::{ApiResponse, ApiResult, AppState, PageResponse};
use crate::auth::AuthUser;
use crate::store::{Client, ClientPatch, ClientSummary, ListQuery, NewClient};

/// Client routes, nested under `/api/clients`
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_clients).post(create_client))
        .route(
            "/:id",
            get(get_client).put(update_client).delete(delete_client),
        )
}

#[instrument(skip_all)]
async fn list_clients(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<PageResponse<ClientSummary>> {
    let Query(query) = query?;
    Ok(state.store.list_clients(&query).await?.into())
}

#[instrument(skip_all)]
async fn get_client(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ApiResponse<ClientSummary>> {
    let Path(id) = id?;
    Ok(ApiResponse::new(state.store.get_client(id).await?))
}

#[instrument(skip_all)]
async fn create_client(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<NewClient>, JsonRejection>,
) -> ApiResult<(StatusCode, ApiResponse<Client>)> {
    let Json(mut input) = payload?;
    input.created_by = Some(user.id);
    let client = state.store.create_client(input).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::new(client).with_message("Client created"),
    ))
}

#[instrument(skip_all)]
async fn update_client(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ClientPatch>, JsonRejection>,
) -> ApiResult<ApiResponse<Client>> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    let client = state.store.update_client(id, patch).await?;
    Ok(ApiResponse::new(client).with_message("Client updated"))
}

#[instrument(skip_all)]
async fn delete_client(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ApiResponse<()>> {
    let Path(id) = id?;
    state.store.delete_client(id).await?;
    Ok(ApiResponse::message("Client deleted"))
}
