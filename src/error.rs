//! Error types for the service and API responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while acquiring models or running OCR
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("unsupported language '{lang}' (supported: {supported})")]
    UnsupportedLanguage { lang: String, supported: String },

    #[error("model '{name}' is not installed at {path:?}")]
    ModelMissing { name: String, path: PathBuf },

    #[error("failed to load model {path:?}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("invalid archive {path:?}: {message}")]
    InvalidArchive { path: PathBuf, message: String },

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("OCR engine not ready")]
    NotReady,

    #[error("too many pending requests")]
    Busy,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OcrError {
    pub fn download(url: &str, message: impl std::fmt::Display) -> Self {
        Self::Download {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn inference(message: impl std::fmt::Display) -> Self {
        Self::Inference(message.to_string())
    }
}

pub type OcrResult<T> = Result<T, OcrError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<OcrError> for ApiError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::NotReady | OcrError::Busy => ApiError::Unavailable(err.to_string()),
            OcrError::UnsupportedLanguage { .. } | OcrError::InvalidImage(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}
