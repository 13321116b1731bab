//! Request-level error taxonomy and its HTTP mapping.
//!
//! Every error renders as a flat JSON body:
//!
//! ```json
//! { "error": "Page and size should be greater than 0" }
//! ```
//!
//! | Variant | Status |
//! |---------|--------|
//! | `BadRequest`, `NoFileUploaded`, `NoFileSelected`, `UnsupportedFormat`, `EmptyContent`, `InvalidMode`, `InvalidPageArgs`, `Extraction` | 400 |
//! | `AuthError` | 401 |
//! | `NotFound` | 404 |
//! | `PayloadTooLarge` | 413 |
//! | `Internal` | 500 |
//! | `StoreUnavailable` | 503 |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use search_gateway_core::error::StoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("No file uploaded")]
    NoFileUploaded,

    #[error("No file selected")]
    NoFileSelected,

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("No extractable content in file")]
    EmptyContent,

    #[error("Invalid search type")]
    InvalidMode,

    #[error("Page and size should be greater than 0")]
    InvalidPageArgs,

    #[error("{0}")]
    Extraction(String),

    #[error("Invalid username or password")]
    AuthError,

    #[error("{0}")]
    NotFound(String),

    #[error("File exceeds the upload limit of {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Search backend unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::NoFileUploaded
            | ApiError::NoFileSelected
            | ApiError::UnsupportedFormat(_)
            | ApiError::EmptyContent
            | ApiError::InvalidMode
            | ApiError::InvalidPageArgs
            | ApiError::Extraction(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthError => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Rejected { status, reason } if status == 400 => {
                ApiError::BadRequest(format!("query rejected by search backend: {}", reason))
            }
            other => ApiError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
