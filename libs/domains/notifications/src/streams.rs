//! Stream definitions for the notifications domain.

use crate::error::NotificationResult;
use crate::models::UserEvent;
use redis::aio::ConnectionManager;
use tracing::debug;

/// User lifecycle events stream definition.
pub struct UserEventStream;

impl UserEventStream {
    /// Stream carrying user lifecycle events.
    pub const STREAM_NAME: &'static str = "users:events";

    /// Consumer group for notification workers.
    pub const CONSUMER_GROUP: &'static str = "notification_workers";

    /// Dead letter stream for events that exhausted their retries.
    pub const DLQ_STREAM: &'static str = "notifications:dlq";

    /// Maximum stream length before auto-trim (MAXLEN ~).
    pub const MAX_LENGTH: i64 = 100_000;

    /// Stream entry field holding the JSON event payload.
    pub const EVENT_FIELD: &'static str = "event";
}

/// Append a user event to the stream, trimming it to [`UserEventStream::MAX_LENGTH`].
///
/// Returns the assigned stream entry id.
pub async fn publish_event(
    redis: &ConnectionManager,
    event: &UserEvent,
) -> NotificationResult<String> {
    let mut conn = redis.clone();
    let payload = serde_json::to_string(event)?;

    let id: String = redis::cmd("XADD")
        .arg(UserEventStream::STREAM_NAME)
        .arg("MAXLEN")
        .arg("~")
        .arg(UserEventStream::MAX_LENGTH)
        .arg("*")
        .arg(UserEventStream::EVENT_FIELD)
        .arg(&payload)
        .query_async(&mut conn)
        .await?;

    debug!(
        stream_id = %id,
        kind = %event.event_type,
        to = %event.email,
        "Published user event"
    );

    Ok(id)
}
