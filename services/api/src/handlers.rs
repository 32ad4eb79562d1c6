//! Axum Handlers for the REST API
//!
//! Document uploads for the interview. Both endpoints accept a multipart form
//! with a single `file` field.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::{
    interview::DocumentKind,
    models::{ErrorResponse, UploadForm, UploadResponse},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                warn!(%message, "Rejected request.");
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(err.to_string())),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Upload the candidate's resume.
#[utoipa::path(
    post,
    path = "/upload/resume",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Resume stored", body = UploadResponse),
        (status = 400, description = "No file in the form", body = ErrorResponse),
        (status = 500, description = "Could not store the file", body = ErrorResponse)
    )
)]
pub async fn upload_resume(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    store_upload(&state, DocumentKind::Resume, multipart).await
}

/// Upload the job description for the position.
#[utoipa::path(
    post,
    path = "/upload/jd",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Job description stored", body = UploadResponse),
        (status = 400, description = "No file in the form", body = ErrorResponse),
        (status = 500, description = "Could not store the file", body = ErrorResponse)
    )
)]
pub async fn upload_jd(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    store_upload(&state, DocumentKind::JobDescription, multipart).await
}

async fn store_upload(
    state: &AppState,
    kind: DocumentKind,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("The file has no name".to_string()))?;
        let contents = field.bytes().await?;
        let path = state.documents.save(kind, &file_name, &contents).await?;
        return Ok(Json(UploadResponse::success(path.display().to_string())));
    }
    Err(ApiError::BadRequest("No file provided".to_string()))
}
