//! Data models for the notifications domain.

use serde::{Deserialize, Serialize};

/// Lifecycle event kinds carried on the user events stream.
///
/// The set is closed. Any unrecognized `eventType` string decodes into
/// `Unknown` instead of failing the whole message, so the consumer can
/// reject it permanently without wedging the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A user account was created.
    #[serde(rename = "USER_CREATED")]
    UserCreated,
    /// A user account was deleted.
    #[serde(rename = "USER_DELETED")]
    UserDeleted,
    /// Fallback for event types this service does not recognize.
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// Whether this kind maps to a notification template.
    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::UserCreated => write!(f, "USER_CREATED"),
            EventKind::UserDeleted => write!(f, "USER_DELETED"),
            EventKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// An inbound user lifecycle event, decoded from one stream entry.
///
/// Immutable once decoded; discarded after one dispatch attempt sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    /// What happened to the account.
    pub event_type: EventKind,
    /// Recipient address.
    pub email: String,
    /// Display name for personalization, if the producer supplied one.
    #[serde(default)]
    pub name: Option<String>,
    /// Originating user record id, carried for log correlation only.
    #[serde(default)]
    pub id: Option<i64>,
}

impl UserEvent {
    /// Minimal syntactic check on the recipient address: non-empty and
    /// contains an `@`. Anything failing this can never be delivered.
    pub fn has_valid_email(&self) -> bool {
        let email = self.email.trim();
        !email.is_empty() && email.contains('@')
    }
}

/// A rendered notification, produced fresh per dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_created_event() {
        let json = r#"{"eventType":"USER_CREATED","email":"ann@example.com","name":"Ann","id":42}"#;
        let event: UserEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type, EventKind::UserCreated);
        assert_eq!(event.email, "ann@example.com");
        assert_eq!(event.name.as_deref(), Some("Ann"));
        assert_eq!(event.id, Some(42));
    }

    #[test]
    fn test_decode_deleted_event_without_optionals() {
        let json = r#"{"eventType":"USER_DELETED","email":"bob@example.com"}"#;
        let event: UserEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type, EventKind::UserDeleted);
        assert_eq!(event.name, None);
        assert_eq!(event.id, None);
    }

    #[test]
    fn test_unrecognized_event_type_decodes_as_unknown() {
        let json = r#"{"eventType":"USER_SUSPENDED","email":"x@example.com"}"#;
        let event: UserEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type, EventKind::Unknown);
        assert!(!event.event_type.is_known());
    }

    #[test]
    fn test_malformed_payload_fails_decoding() {
        let result = serde_json::from_str::<UserEvent>("{not json");
        assert!(result.is_err());

        // Missing required email field
        let result = serde_json::from_str::<UserEvent>(r#"{"eventType":"USER_CREATED"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_email_validity() {
        let mut event: UserEvent =
            serde_json::from_str(r#"{"eventType":"USER_CREATED","email":"a@b.example"}"#).unwrap();
        assert!(event.has_valid_email());

        event.email = String::new();
        assert!(!event.has_valid_email());

        event.email = "no-at-sign".to_string();
        assert!(!event.has_valid_email());

        event.email = "   ".to_string();
        assert!(!event.has_valid_email());
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::UserCreated.to_string(), "USER_CREATED");
        assert_eq!(EventKind::UserDeleted.to_string(), "USER_DELETED");
        assert_eq!(EventKind::Unknown.to_string(), "UNKNOWN");
    }
}
