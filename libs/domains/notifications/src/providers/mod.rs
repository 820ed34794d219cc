//! Email provider implementations.
//!
//! This module contains the `EmailProvider` trait and implementations for
//! the outbound mail channels in use.

mod sendgrid;
mod smtp;

pub use sendgrid::{SendGridConfig, SendGridProvider};
pub use smtp::{SmtpConfig, SmtpProvider};

use crate::error::NotificationResult;
use async_trait::async_trait;

/// Represents a sent email with a provider-specific message ID.
#[derive(Debug, Clone)]
pub struct SentEmail {
    /// Provider-specific message ID for tracking.
    pub message_id: Option<String>,
    /// Whether the email was accepted for delivery.
    pub accepted: bool,
}

/// Email content ready for sending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient email address.
    pub to_email: String,
    /// Recipient name, if known.
    pub to_name: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
}

/// Trait for email sending providers.
///
/// A provider performs exactly one outbound send attempt per call and
/// returns every non-success outcome to the caller; retrying is the
/// caller's decision, not the provider's.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send an email.
    async fn send(&self, email: &OutboundEmail) -> NotificationResult<SentEmail>;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;

    /// Check if the provider is healthy/configured.
    async fn health_check(&self) -> NotificationResult<bool>;
}
