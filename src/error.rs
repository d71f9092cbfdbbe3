// Error types shared by the store client, the services and the Axum handlers

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::store::EntityKind;

// Failures talking to the remote store / object storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to remote store failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{kind} record '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("malformed record from remote store: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    // Used by the in-memory store's failure injection and by unreachable backends
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

// Application error returned by handlers and services
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    // Editor session closed underneath the request, or a conflicting state
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

// Convert errors into JSON responses ({ success: false, error })
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(message) => {
                tracing::debug!("Validation failed: {}", message);
                (StatusCode::BAD_REQUEST, message)
            }
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Conflict(message) => {
                tracing::warn!("Conflict: {}", message);
                (StatusCode::CONFLICT, message)
            }
            AppError::Store(StoreError::NotFound { kind, id }) => (
                StatusCode::NOT_FOUND,
                format!("{} record '{}' not found", kind, id),
            ),
            AppError::Store(e) => {
                tracing::error!("Remote store error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "The content backend is unavailable, please retry".to_string(),
                )
            }
            AppError::InternalServerError(e) => {
                // Log the detailed error here, don't expose internals to the client
                tracing::error!("Internal server error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        (status, Json(json!({ "success": false, "error": error_message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
