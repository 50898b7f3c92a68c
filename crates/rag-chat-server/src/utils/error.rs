use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend transport failure (timeout, refused connection, non-2xx).
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Retrieval backend shape mismatch, e.g. embedding vs index dimension.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ChatError::InvalidArgument(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        ChatError::Unavailable(msg.into())
    }

    /// Collapse backend-side validation failures into `Unavailable` for
    /// callers that only distinguish "bad input" from "backend failed".
    pub fn into_backend_failure(self) -> Self {
        match self {
            ChatError::Validation(msg) => ChatError::Unavailable(msg),
            other => other,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ChatError::InvalidArgument(_) => "InvalidArgument",
            ChatError::NotFound(_) => "NotFound",
            ChatError::Unavailable(_) => "Unavailable",
            ChatError::Validation(_) => "ValidationError",
            ChatError::Internal(_) => "InternalError",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let error_type = self.kind();
        let (status, message) = match self {
            ChatError::InvalidArgument(msg) => {
                tracing::warn!("Invalid argument: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            ChatError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, msg)
            }
            ChatError::Validation(msg) => {
                tracing::warn!("Validation error: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            ChatError::Unavailable(msg) => {
                tracing::error!("Backend unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ChatError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
