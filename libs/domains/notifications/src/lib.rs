//! Notifications Domain
//!
//! Email notifications for user lifecycle events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   Redis Stream   │  ← users:events
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  EventConsumer   │  ← decodes, classifies, drives retry/backoff
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │ DispatchService  │  ← renders and sends one notification
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  EmailProvider   │  ← SMTP (dev), SendGrid (prod)
//! └──────────────────┘
//! ```
//!
//! Each inbound event is processed as an independent unit of work to a
//! terminal state: delivered, permanently rejected (malformed payload,
//! invalid recipient, unrecognized kind), or exhausted after bounded
//! retries, in which case it lands on the dead letter stream.

pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod retry;
pub mod streams;
pub mod templates;

// Re-export commonly used types
pub use consumer::{ConsumerConfig, DeliveryOutcome, EventConsumer, RejectReason};
pub use dispatch::{DispatchError, DispatchService};
pub use error::{NotificationError, NotificationResult};
pub use models::{EventKind, RenderedMessage, UserEvent};
pub use providers::{EmailProvider, OutboundEmail, SendGridProvider, SentEmail, SmtpProvider};
pub use retry::{RetryDecision, RetryPolicy, Sleep, TokioSleep};
pub use streams::UserEventStream;
pub use templates::TemplateEngine;
