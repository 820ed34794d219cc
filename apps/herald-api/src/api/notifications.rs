//! Notification API handlers.
//!
//! Thin request/response mapping over the dispatch core. Validation
//! happens in the extractor; dispatch failures map to a 500 with a
//! descriptive message.

use crate::error::ApiError;
use crate::extractors::ValidatedJson;
use crate::state::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use domain_notifications::{EventKind, UserEvent};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

/// Create the notifications router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/email", post(send_email))
        .route("/status", get(service_status))
        .route("/test-email", post(send_test_email))
}

/// Request body for manually triggering an email.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    /// Recipient address.
    #[validate(
        length(min = 1, message = "Email must not be blank"),
        email(message = "Invalid email format")
    )]
    pub to_email: String,
    /// Recipient display name for personalization.
    pub user_name: Option<String>,
}

/// Status response for email operations.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_email: Option<String>,
    pub sent_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_type: Option<String>,
}

/// Map a manual trigger onto the event shape the dispatch core consumes.
fn manual_event(to_email: &str, user_name: Option<&str>) -> UserEvent {
    UserEvent {
        event_type: EventKind::UserCreated,
        email: to_email.to_string(),
        name: user_name.map(|s| s.to_string()),
        id: None,
    }
}

/// Send an email notification to the given recipient.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/email",
    tag = "notifications",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Email sent successfully", body = EmailResponse),
        (status = 400, description = "Request validation failed", body = crate::error::ErrorResponse),
        (status = 500, description = "Email dispatch failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_email(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<EmailRequest>,
) -> Result<Json<EmailResponse>, ApiError> {
    info!(to = %request.to_email, "POST /api/v1/notifications/email");

    let event = manual_event(&request.to_email, request.user_name.as_deref());
    state.dispatch.dispatch(&event).await?;

    Ok(Json(EmailResponse {
        status: "SUCCESS".to_string(),
        message: "Email sent successfully".to_string(),
        to_email: Some(request.to_email),
        sent_at: Utc::now(),
        email_type: Some("USER_CREATED_NOTIFICATION".to_string()),
    }))
}

/// Get the current status of the notification service.
#[utoipa::path(
    get,
    path = "/api/v1/notifications/status",
    tag = "notifications",
    responses(
        (status = 200, description = "Service status", body = EmailResponse)
    )
)]
pub async fn service_status(State(state): State<AppState>) -> Json<EmailResponse> {
    Json(EmailResponse {
        status: "RUNNING".to_string(),
        message: format!(
            "{} {} is running normally",
            state.app.name, state.app.version
        ),
        to_email: None,
        sent_at: Utc::now(),
        email_type: None,
    })
}

/// Send a test email to verify the service works end to end.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/test-email",
    tag = "notifications",
    responses(
        (status = 200, description = "Test email sent", body = EmailResponse),
        (status = 500, description = "Email dispatch failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_test_email(
    State(state): State<AppState>,
) -> Result<Json<EmailResponse>, ApiError> {
    let test_email = "test@example.com";
    info!(to = %test_email, "POST /api/v1/notifications/test-email");

    let event = manual_event(test_email, Some("Test User"));
    state.dispatch.dispatch(&event).await?;

    Ok(Json(EmailResponse {
        status: "SUCCESS".to_string(),
        message: "Test email sent successfully".to_string(),
        to_email: Some(test_email.to_string()),
        sent_at: Utc::now(),
        email_type: Some("TEST_NOTIFICATION".to_string()),
    }))
}

/// Basic information about the notification service.
#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "notifications",
    responses(
        (status = 200, description = "Service information", body = EmailResponse)
    )
)]
pub async fn service_info(State(state): State<AppState>) -> Json<EmailResponse> {
    Json(EmailResponse {
        status: "AVAILABLE".to_string(),
        message: format!("{} is ready to send notifications", state.app.name),
        to_email: None,
        sent_at: Utc::now(),
        email_type: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use domain_notifications::{
        DispatchService, EmailProvider, NotificationError, NotificationResult, OutboundEmail,
        SentEmail, TemplateEngine,
    };
    use std::sync::Arc;

    struct StubProvider {
        fail: bool,
    }

    #[async_trait]
    impl EmailProvider for StubProvider {
        async fn send(&self, _email: &OutboundEmail) -> NotificationResult<SentEmail> {
            if self.fail {
                Err(NotificationError::ProviderError(
                    "connection refused".to_string(),
                ))
            } else {
                Ok(SentEmail {
                    message_id: None,
                    accepted: true,
                })
            }
        }

        fn name(&self) -> &'static str {
            "stub"
        }

        async fn health_check(&self) -> NotificationResult<bool> {
            Ok(true)
        }
    }

    fn state(fail: bool) -> AppState {
        AppState {
            dispatch: Arc::new(DispatchService::new(
                Arc::new(StubProvider { fail }),
                Arc::new(TemplateEngine::new("https://example.com").unwrap()),
            )),
            app: core_config::app_info!(),
        }
    }

    #[test]
    fn test_email_request_validation() {
        let valid = EmailRequest {
            to_email: "ann@example.com".to_string(),
            user_name: None,
        };
        assert!(valid.validate().is_ok());

        let blank = EmailRequest {
            to_email: String::new(),
            user_name: None,
        };
        let errors = blank.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("to_email"));

        let malformed = EmailRequest {
            to_email: "not-an-address".to_string(),
            user_name: Some("Ann".to_string()),
        };
        assert!(malformed.validate().is_err());
    }

    #[test]
    fn test_manual_event_maps_to_created_kind() {
        let event = manual_event("ann@example.com", Some("Ann"));
        assert_eq!(event.event_type, EventKind::UserCreated);
        assert_eq!(event.email, "ann@example.com");
        assert_eq!(event.name.as_deref(), Some("Ann"));
        assert_eq!(event.id, None);
    }

    #[tokio::test]
    async fn test_send_email_success_response() {
        let request = EmailRequest {
            to_email: "ann@example.com".to_string(),
            user_name: Some("Ann".to_string()),
        };

        let response = send_email(State(state(false)), ValidatedJson(request))
            .await
            .unwrap();

        assert_eq!(response.0.status, "SUCCESS");
        assert_eq!(response.0.to_email.as_deref(), Some("ann@example.com"));
        assert_eq!(
            response.0.email_type.as_deref(),
            Some("USER_CREATED_NOTIFICATION")
        );
    }

    #[tokio::test]
    async fn test_send_email_failure_maps_to_500() {
        let request = EmailRequest {
            to_email: "ann@example.com".to_string(),
            user_name: None,
        };

        let err = send_email(State(state(true)), ValidatedJson(request))
            .await
            .unwrap_err();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_service_status_reports_running() {
        let response = service_status(State(state(false))).await;
        assert_eq!(response.0.status, "RUNNING");
    }
}
