//! Notification message rendering.
//!
//! Handlebars-based rendering of the fixed plain-text message per event
//! kind. Templates are registered from static strings at construction, so a
//! broken template surfaces as a startup configuration error, never at
//! dispatch time.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{EventKind, RenderedMessage, UserEvent};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

const WELCOME_SUBJECT: &str = "Welcome!";
const ACCOUNT_DELETED_SUBJECT: &str = "Account deleted";
const UNSUPPORTED_SUBJECT: &str = "Notification";

const WELCOME_TEXT_TEMPLATE: &str = "\
Hello, {{user_name}}!

Your account at {{site_url}} has been created successfully.

Best regards,
The support team
";

const ACCOUNT_DELETED_TEXT_TEMPLATE: &str = "\
Hello{{#if user_name}}, {{user_name}}{{/if}}!

Your account has been deleted.

Best regards,
The support team
";

/// Placeholder greeting used when the event carries no display name.
const GENERIC_USER_NAME: &str = "user";

#[derive(Serialize)]
struct WelcomeData<'a> {
    user_name: &'a str,
    site_url: &'a str,
}

#[derive(Serialize)]
struct AccountDeletedData<'a> {
    user_name: Option<&'a str>,
}

/// Template engine for rendering notification messages.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    site_url: String,
}

impl TemplateEngine {
    /// Create a new template engine with all templates registered.
    ///
    /// `site_url` is the externally configured site identifier referenced by
    /// the welcome message.
    pub fn new(site_url: impl Into<String>) -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();
        // Output is plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars
            .register_template_string("welcome_text", WELCOME_TEXT_TEMPLATE)
            .map_err(|e| {
                NotificationError::ConfigError(format!("Failed to register welcome_text: {}", e))
            })?;
        handlebars
            .register_template_string("account_deleted_text", ACCOUNT_DELETED_TEXT_TEMPLATE)
            .map_err(|e| {
                NotificationError::ConfigError(format!(
                    "Failed to register account_deleted_text: {}",
                    e
                ))
            })?;

        Ok(Self {
            handlebars,
            site_url: site_url.into(),
        })
    }

    /// Render the message for an event.
    ///
    /// Total over all kinds: an `Unknown` kind yields a neutral placeholder
    /// message instead of an error, although classification upstream means
    /// that branch is never dispatched.
    pub fn render(&self, event: &UserEvent) -> NotificationResult<RenderedMessage> {
        match event.event_type {
            EventKind::UserCreated => self.render_welcome(event.name.as_deref()),
            EventKind::UserDeleted => self.render_account_deleted(event.name.as_deref()),
            EventKind::Unknown => Ok(Self::unsupported()),
        }
    }

    /// Render the welcome message sent after account creation.
    pub fn render_welcome(&self, user_name: Option<&str>) -> NotificationResult<RenderedMessage> {
        debug!(user = ?user_name, "Rendering welcome message");

        let body = self.handlebars.render(
            "welcome_text",
            &WelcomeData {
                user_name: user_name.unwrap_or(GENERIC_USER_NAME),
                site_url: &self.site_url,
            },
        )?;

        Ok(RenderedMessage {
            subject: WELCOME_SUBJECT.to_string(),
            body,
        })
    }

    /// Render the account-removal message sent after deletion.
    pub fn render_account_deleted(
        &self,
        user_name: Option<&str>,
    ) -> NotificationResult<RenderedMessage> {
        debug!(user = ?user_name, "Rendering account deleted message");

        let body = self
            .handlebars
            .render("account_deleted_text", &AccountDeletedData { user_name })?;

        Ok(RenderedMessage {
            subject: ACCOUNT_DELETED_SUBJECT.to_string(),
            body,
        })
    }

    fn unsupported() -> RenderedMessage {
        RenderedMessage {
            subject: UNSUPPORTED_SUBJECT.to_string(),
            body: "No notification is configured for this event kind.\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE_URL: &str = "https://example.com";

    fn engine() -> TemplateEngine {
        TemplateEngine::new(SITE_URL).unwrap()
    }

    fn event(kind: &str, name: Option<&str>) -> UserEvent {
        serde_json::from_value(serde_json::json!({
            "eventType": kind,
            "email": "user@example.com",
            "name": name,
        }))
        .unwrap()
    }

    #[test]
    fn test_welcome_contains_site_url_and_name() {
        let rendered = engine().render(&event("USER_CREATED", Some("Ann"))).unwrap();

        assert!(!rendered.subject.is_empty());
        assert!(!rendered.body.is_empty());
        assert!(rendered.body.contains(SITE_URL));
        assert!(rendered.body.contains("Hello, Ann!"));
    }

    #[test]
    fn test_welcome_falls_back_to_generic_greeting() {
        let rendered = engine().render(&event("USER_CREATED", None)).unwrap();

        assert!(rendered.body.contains("Hello, user!"));
        assert!(rendered.body.contains(SITE_URL));
    }

    #[test]
    fn test_account_deleted_with_name_contains_it_exactly_once() {
        let rendered = engine().render(&event("USER_DELETED", Some("Ann"))).unwrap();

        assert!(!rendered.subject.is_empty());
        assert_eq!(rendered.body.matches("Ann").count(), 1);
        assert!(rendered.body.contains("Hello, Ann!"));
    }

    #[test]
    fn test_account_deleted_without_name_omits_greeting_name() {
        let rendered = engine().render(&event("USER_DELETED", None)).unwrap();

        assert!(rendered.body.starts_with("Hello!"));
        assert!(!rendered.body.contains(", "));
    }

    #[test]
    fn test_unknown_kind_renders_neutral_message() {
        let rendered = engine().render(&event("SOMETHING_ELSE", None)).unwrap();

        assert!(!rendered.subject.is_empty());
        assert!(!rendered.body.is_empty());
    }

    #[test]
    fn test_render_is_idempotent() {
        let engine = engine();
        let event = event("USER_CREATED", Some("Ann"));

        let first = engine.render(&event).unwrap();
        let second = engine.render(&event).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_names_are_not_escaped() {
        let rendered = engine()
            .render(&event("USER_CREATED", Some("O'Brien & Sons")))
            .unwrap();

        assert!(rendered.body.contains("O'Brien & Sons"));
    }
}
