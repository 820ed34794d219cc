//! API error types and their HTTP mappings.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain_notifications::DispatchError;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Standard error response structure returned for all error cases.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error identifier.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured details (e.g., validation field errors).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Errors surfaced by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Dispatch(err) => {
                tracing::error!(error = %err, "Email dispatch failed");
                // Descriptive message only; internals stay in the logs.
                let body = ErrorResponse {
                    error: "InternalServerError".to_string(),
                    message: format!("Failed to send email: {}", err),
                    details: None,
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_notifications::NotificationError;

    #[test]
    fn test_dispatch_error_maps_to_500() {
        let err = ApiError::Dispatch(DispatchError::Transport(
            NotificationError::ProviderError("connection refused".to_string()),
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
