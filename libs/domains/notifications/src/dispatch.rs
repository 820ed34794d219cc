//! Dispatch of a single notification: classify, render, send.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{EventKind, UserEvent};
use crate::providers::{EmailProvider, OutboundEmail};
use crate::templates::TemplateEngine;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from dispatching one event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The event kind is outside the recognized set. Permanent: no retry
    /// can reclassify it.
    #[error("unknown event kind")]
    UnknownKind,

    /// Template rendering failed. Permanent: the same input renders the
    /// same way on every attempt.
    #[error("template rendering failed: {0}")]
    Template(String),

    /// The outbound transport rejected the send, timed out, or could not
    /// connect. Transient.
    #[error("transport failure")]
    Transport(#[source] NotificationError),
}

impl DispatchError {
    /// Whether a retry can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Transport(_))
    }
}

/// Orchestrates render + transport-send for a single event.
///
/// Holds no per-event state; safe to share across worker tasks.
pub struct DispatchService {
    provider: Arc<dyn EmailProvider>,
    templates: Arc<TemplateEngine>,
}

impl DispatchService {
    /// Create a new dispatch service.
    pub fn new(provider: Arc<dyn EmailProvider>, templates: Arc<TemplateEngine>) -> Self {
        Self {
            provider,
            templates,
        }
    }

    /// Name of the configured provider, for logging.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Dispatch one notification for one event.
    ///
    /// The transport is invoked at most once; retrying is the caller's
    /// responsibility.
    pub async fn dispatch(&self, event: &UserEvent) -> Result<(), DispatchError> {
        if event.event_type == EventKind::Unknown {
            return Err(DispatchError::UnknownKind);
        }

        let message = self
            .templates
            .render(event)
            .map_err(|e| DispatchError::Template(e.to_string()))?;

        let email = OutboundEmail {
            to_email: event.email.clone(),
            to_name: event.name.clone(),
            subject: message.subject,
            body: message.body,
        };

        let sent = self
            .provider
            .send(&email)
            .await
            .map_err(DispatchError::Transport)?;

        info!(
            to = %event.email,
            kind = %event.event_type,
            user_id = ?event.id,
            message_id = ?sent.message_id,
            "Notification dispatched"
        );

        Ok(())
    }

    /// Provider health, for readiness probes.
    pub async fn health_check(&self) -> NotificationResult<bool> {
        self.provider.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SentEmail;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::always;

    mock! {
        Provider {}

        #[async_trait]
        impl EmailProvider for Provider {
            async fn send(&self, email: &OutboundEmail) -> NotificationResult<SentEmail>;
            fn name(&self) -> &'static str;
            async fn health_check(&self) -> NotificationResult<bool>;
        }
    }

    fn service(provider: MockProvider) -> DispatchService {
        DispatchService::new(
            Arc::new(provider),
            Arc::new(TemplateEngine::new("https://example.com").unwrap()),
        )
    }

    fn created_event() -> UserEvent {
        serde_json::from_str(
            r#"{"eventType":"USER_CREATED","email":"user@example.com","name":"Ann"}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_sends_exactly_one_welcome_email() {
        let mut provider = MockProvider::new();
        provider
            .expect_send()
            .withf(|email: &OutboundEmail| {
                email.to_email == "user@example.com"
                    && email.subject == "Welcome!"
                    && email.body.contains("https://example.com")
            })
            .times(1)
            .returning(|_| {
                Ok(SentEmail {
                    message_id: Some("msg-1".to_string()),
                    accepted: true,
                })
            });

        let result = service(provider).dispatch(&created_event()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_kind_never_invokes_transport() {
        let mut provider = MockProvider::new();
        provider.expect_send().times(0);

        let event: UserEvent =
            serde_json::from_str(r#"{"eventType":"UNKNOWN_KIND","email":"x@example.com"}"#)
                .unwrap();

        let result = service(provider).dispatch(&event).await;
        let err = result.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownKind));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_transport_failure_is_wrapped_and_retryable() {
        let mut provider = MockProvider::new();
        provider
            .expect_send()
            .with(always())
            .times(1)
            .returning(|_| {
                Err(NotificationError::ProviderError(
                    "connection refused".to_string(),
                ))
            });

        let result = service(provider).dispatch(&created_event()).await;
        let err = result.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert!(err.is_retryable());
    }
}
