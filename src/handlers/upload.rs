//! `/api/upload` handlers: extract an uploaded PDF and store it as a document

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Router};
use tracing::{debug, info, instrument};

use super::{document_title, ApiError, ApiResponse, ApiResult, AppState};
use crate::auth::AuthUser;
use crate::error::Error;
use crate::pdf::PdfExtractor;
use crate::store::{DocumentKind, DocumentWithClient, NewDocument};

/// Multipart field carrying the file
pub const FILE_FIELD: &str = "pdf";

/// Only accepted content type
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Room for multipart boundaries and the other form fields
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Upload routes, nested under `/api/upload`
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/pdf", post(upload_pdf))
}

/// Request body limit for a given file size limit
pub fn body_limit(max_file_bytes: usize) -> usize {
    max_file_bytes.saturating_add(MULTIPART_OVERHEAD)
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

struct UploadedFile {
    name: Option<String>,
    bytes: Vec<u8>,
}

/// Accept a multipart form with a `pdf` file and a `client_id` field.
#[instrument(skip_all)]
async fn upload_pdf(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, ApiResponse<DocumentWithClient>)> {
    let mut multipart = multipart?;
    let mut file: Option<UploadedFile> = None;
    let mut client_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(FILE_FIELD) => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.eq_ignore_ascii_case(PDF_CONTENT_TYPE) {
                    return Err(ApiError::bad_request("Only PDF files are allowed"));
                }
                let name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                file = Some(UploadedFile {
                    name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("client_id") => client_id = Some(field.text().await?),
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let file = file.ok_or_else(|| ApiError::bad_request("No PDF file was uploaded"))?;
    let client_id = client_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("client_id is required"))?
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request("client_id must be an integer"))?;

    if file.bytes.len() > state.max_upload_bytes {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "File too large: limit is {} bytes",
                state.max_upload_bytes
            ),
        ));
    }

    state.store.get_client(client_id).await?;

    let size = file.bytes.len();
    let file_name = file.name.clone();
    let extraction = tokio::task::spawn_blocking(move || {
        PdfExtractor::extract(&file.bytes, file.name.as_deref())
    })
    .await
    .map_err(|e| Error::generic(format!("PDF task failed: {}", e)))??;

    let metadata = extraction.metadata(file_name.as_deref(), size);
    let document = state
        .store
        .create_document(NewDocument {
            title: document_title(&extraction.title),
            content: extraction.text,
            client_id,
            kind: Some(DocumentKind::Pdf),
            metadata: Some(metadata.clone()),
            uploaded_by: Some(user.id),
            processed_at: None,
        })
        .await?;
    state.metrics.record_pdf_processed();

    info!(
        "Stored PDF {:?} ({} bytes) as document {}",
        file_name, size, document.document.id
    );

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(document)
            .with_message("PDF processed and document created")
            .with_metadata(metadata),
    ))
}
