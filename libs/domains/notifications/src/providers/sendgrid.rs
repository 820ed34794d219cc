//! SendGrid email provider implementation.

use super::{EmailProvider, OutboundEmail, SentEmail};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// SendGrid API configuration.
#[derive(Debug, Clone)]
pub struct SendGridConfig {
    /// SendGrid API key.
    pub api_key: String,
    /// Sender email address.
    pub from_email: String,
    /// Sender name.
    pub from_name: String,
    /// SendGrid API base URL (defaults to production).
    pub api_url: String,
}

impl SendGridConfig {
    /// Create a new SendGrid configuration.
    pub fn new(api_key: String, from_email: String, from_name: String) -> Self {
        Self {
            api_key,
            from_email,
            from_name,
            api_url: "https://api.sendgrid.com/v3".to_string(),
        }
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> NotificationResult<Self> {
        let api_key = std::env::var("SENDGRID_API_KEY")
            .map_err(|_| NotificationError::ConfigError("SENDGRID_API_KEY not set".to_string()))?;
        let from_email = std::env::var("SENDGRID_FROM_EMAIL").map_err(|_| {
            NotificationError::ConfigError("SENDGRID_FROM_EMAIL not set".to_string())
        })?;
        let from_name =
            std::env::var("SENDGRID_FROM_NAME").unwrap_or_else(|_| "Herald".to_string());

        Ok(Self::new(api_key, from_email, from_name))
    }
}

/// SendGrid email provider.
pub struct SendGridProvider {
    config: SendGridConfig,
    client: Client,
}

impl SendGridProvider {
    /// Create a new SendGrid provider.
    pub fn new(config: SendGridConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Create a provider from environment variables.
    pub fn from_env() -> NotificationResult<Self> {
        let config = SendGridConfig::from_env()?;
        Ok(Self::new(config))
    }
}

// SendGrid API request/response structures

#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<Personalization>,
    from: EmailAddress,
    subject: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
}

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SendGridError {
    errors: Vec<SendGridErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)] // Fields are populated by deserialization from SendGrid API
struct SendGridErrorDetail {
    message: String,
    field: Option<String>,
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    async fn send(&self, email: &OutboundEmail) -> NotificationResult<SentEmail> {
        debug!(
            to = %email.to_email,
            subject = %email.subject,
            "Sending email via SendGrid"
        );

        let request = SendGridRequest {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: email.to_email.clone(),
                    name: email.to_name.clone(),
                }],
            }],
            from: EmailAddress {
                email: self.config.from_email.clone(),
                name: Some(self.config.from_name.clone()),
            },
            subject: email.subject.clone(),
            content: vec![Content {
                content_type: "text/plain".to_string(),
                value: email.body.clone(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/mail/send", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(to = %email.to_email, error = %e, "SendGrid request failed");
                NotificationError::ProviderError(format!("SendGrid request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<SendGridError>().await {
                Ok(body) => body
                    .errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; "),
                Err(_) => "no error details".to_string(),
            };
            error!(
                to = %email.to_email,
                status = %status,
                detail = %detail,
                "SendGrid rejected email"
            );
            return Err(NotificationError::ProviderError(format!(
                "SendGrid returned {}: {}",
                status, detail
            )));
        }

        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        info!(
            to = %email.to_email,
            message_id = ?message_id,
            "Email sent successfully via SendGrid"
        );

        Ok(SentEmail {
            message_id,
            accepted: true,
        })
    }

    fn name(&self) -> &'static str {
        "SendGrid"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        // An empty API key can never authenticate; anything else is only
        // verifiable by actually sending.
        Ok(!self.config.api_key.is_empty())
    }
}
