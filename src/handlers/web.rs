//! `/api/web` handlers: scrape a page and store it as a document

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tracing::{info, instrument};

use super::{document_title, ApiError, ApiResponse, ApiResult, AppState};
use crate::auth::AuthUser;
use crate::error::Error;
use crate::store::{DocumentKind, DocumentWithClient, NewDocument};

/// Body of `POST /api/web/scrape`
#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    /// Page to scrape
    pub url: Option<String>,
    /// Client that will own the document
    pub client_id: Option<i64>,
}

/// Web routes, nested under `/api/web`
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/scrape", post(scrape_and_store))
}

/// Scrape `url` and store the result as a `url` document for `client_id`.
///
/// The client is checked before any network access.
#[instrument(skip_all)]
async fn scrape_and_store(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, ApiResponse<DocumentWithClient>)> {
    let Json(request) = payload?;

    let url = request
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("url is required"))?;
    let client_id = request
        .client_id
        .ok_or_else(|| ApiError::bad_request("client_id is required"))?;

    state.store.get_client(client_id).await?;

    let page = state.scraper.scrape(url.trim()).await?;
    let metadata = serde_json::to_value(&page.extraction.metadata).map_err(Error::from)?;

    let document = state
        .store
        .create_document(NewDocument {
            title: document_title(&page.extraction.title),
            content: page.extraction.body,
            client_id,
            kind: Some(DocumentKind::Url),
            metadata: Some(metadata.clone()),
            uploaded_by: Some(user.id),
            processed_at: Some(page.processed_at),
        })
        .await?;
    state.metrics.record_page_scraped();

    info!(
        "Stored page {} as document {}",
        url, document.document.id
    );

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(document)
            .with_message("Web page processed and document created")
            .with_metadata(metadata),
    ))
}
