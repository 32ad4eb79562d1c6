//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the upload endpoints, the interview WebSocket and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{ErrorResponse, UploadForm, UploadResponse},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Largest accepted document upload.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::upload_resume, handlers::upload_jd),
    components(schemas(UploadResponse, ErrorResponse, UploadForm)),
    tags(
        (name = "Interviewer API", description = "Document uploads for the voice interviewer")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/upload/resume", post(handlers::upload_resume))
        .route("/upload/jd", post(handlers::upload_jd))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
