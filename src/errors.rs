use crate::services::metadata_store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the create / delete / list operations.
///
/// None of these variants leave a partial mutation behind: validation,
/// authorization, not-found, and conflict are all raised before anything is
/// written.
#[derive(Debug, Error)]
pub enum BucketError {
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized: user authentication required")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("provisioning failed: {0}")]
    Provisioning(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BucketError {
    pub fn is_authorization(&self) -> bool {
        matches!(self, BucketError::Unauthenticated | BucketError::Forbidden(_))
    }
}

pub type BucketResult<T> = Result<T, BucketError>;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<BucketError> for AppError {
    fn from(err: BucketError) -> Self {
        let status = match &err {
            BucketError::Validation(_) => StatusCode::BAD_REQUEST,
            BucketError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BucketError::Forbidden(_) => StatusCode::FORBIDDEN,
            BucketError::NotFound(_) => StatusCode::NOT_FOUND,
            BucketError::Conflict(_) => StatusCode::CONFLICT,
            BucketError::Provisioning(_) | BucketError::Store(_) => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError::new(status, err.to_string())
    }
}
