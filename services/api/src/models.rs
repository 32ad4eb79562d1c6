//! API Models
//!
//! Request and response bodies of the HTTP endpoints, with `utoipa` schemas
//! for the OpenAPI document.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct UploadResponse {
    #[schema(example = "success")]
    pub status: String,
    /// Where the document was stored on the server.
    #[schema(example = "temp/resume/cv.pdf")]
    pub path: String,
}

impl UploadResponse {
    pub fn success(path: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            path: path.into(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    #[schema(example = "error")]
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// Multipart body of the upload endpoints. Only documents the form for
/// OpenAPI; handlers read the field directly.
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
