//! `/api/documents` handlers

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use tracing::instrument;

use super::{ApiResponse, ApiResult, AppState, PageResponse};
use crate::auth::AuthUser;
use crate::store::{DocumentPatch, DocumentWithClient, ListQuery, NewDocument};

/// Document routes, nested under `/api/documents`
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_documents).post(create_document))
        .route("/client/:client_id", get(list_client_documents))
        .route("/user/:user_id", get(list_user_documents))
        .route(
            "/:id",
            get(get_document)
                .put(update_document)
                .delete(delete_document),
        )
}

#[instrument(skip_all)]
async fn list_documents(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<PageResponse<DocumentWithClient>> {
    let Query(query) = query?;
    Ok(state.store.list_documents(&query).await?.into())
}

#[instrument(skip_all)]
async fn list_client_documents(
    State(state): State<Arc<AppState>>,
    client_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<PageResponse<DocumentWithClient>> {
    let Path(client_id) = client_id?;
    let Query(query) = query?;
    Ok(state
        .store
        .list_documents_by_client(client_id, &query)
        .await?
        .into())
}

#[instrument(skip_all)]
async fn list_user_documents(
    State(state): State<Arc<AppState>>,
    user_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<PageResponse<DocumentWithClient>> {
    let Path(user_id) = user_id?;
    let Query(query) = query?;
    Ok(state
        .store
        .list_documents_by_user(user_id, &query)
        .await?
        .into())
}

#[instrument(skip_all)]
async fn get_document(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ApiResponse<DocumentWithClient>> {
    let Path(id) = id?;
    Ok(ApiResponse::new(state.store.get_document(id).await?))
}

#[instrument(skip_all)]
async fn create_document(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<NewDocument>, JsonRejection>,
) -> ApiResult<(StatusCode, ApiResponse<DocumentWithClient>)> {
    let Json(mut input) = payload?;
    input.uploaded_by = Some(user.id);
    let document = state.store.create_document(input).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::new(document).with_message("Document created"),
    ))
}

#[instrument(skip_all)]
async fn update_document(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<DocumentPatch>, JsonRejection>,
) -> ApiResult<ApiResponse<DocumentWithClient>> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    let document = state.store.update_document(id, patch).await?;
    Ok(ApiResponse::new(document).with_message("Document updated"))
}

#[instrument(skip_all)]
async fn delete_document(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ApiResponse<()>> {
    let Path(id) = id?;
    state.store.delete_document(id).await?;
    Ok(ApiResponse::message("Document deleted"))
}
