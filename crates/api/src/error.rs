//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::dispatcher::DispatchError;
use crate::store::StoreError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authorization errors
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Conversation is resolved")]
    ConversationClosed,

    // Transient errors
    #[error("Message could not be sent, please retry")]
    SendFailed,
    #[error("Service unavailable")]
    ServiceUnavailable,

    // Internal errors
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::ConversationClosed => (StatusCode::CONFLICT, "CONVERSATION_CLOSED", self.to_string()),

            ApiError::SendFailed => (StatusCode::SERVICE_UNAVAILABLE, "SEND_FAILED_TRANSIENT", self.to_string()),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string()),

            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ConversationNotFound | DispatchError::MessageNotFound => ApiError::NotFound,
            DispatchError::ConversationClosed => ApiError::ConversationClosed,
            DispatchError::Validation(msg) => ApiError::Validation(msg),
            DispatchError::TransientSendFailure(_) => ApiError::SendFailed,
            DispatchError::Unavailable(_) => ApiError::ServiceUnavailable,
            DispatchError::Internal(e) => {
                tracing::error!(error = %e, "Dispatcher internal error");
                ApiError::Internal
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        DispatchError::from(err).into()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
