//! Event consumer: drives the retry state machine around dispatch.
//!
//! Entries are read from the user events stream through a consumer group.
//! Each entry runs to a terminal state before it is acknowledged:
//!
//! ```text
//! Received → Dispatching → Succeeded
//!                        → RetryScheduled → Dispatching
//!                        → Exhausted            (→ DLQ)
//!                        → PermanentlyRejected
//! ```
//!
//! A shutdown that interrupts a backoff wait leaves the entry
//! unacknowledged so the group redelivers it (at-least-once).

use crate::dispatch::{DispatchError, DispatchService};
use crate::error::NotificationResult;
use crate::metrics;
use crate::models::UserEvent;
use crate::retry::{RetryDecision, RetryPolicy, Sleep, TokioSleep};
use crate::streams::UserEventStream;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the event consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Redis stream name.
    pub stream_name: String,
    /// Consumer group name.
    pub consumer_group: String,
    /// Unique consumer ID within the group.
    pub consumer_id: String,
    /// Dead letter stream for exhausted events.
    pub dlq_stream: String,
    /// Batch size for reading entries.
    pub batch_size: usize,
    /// Poll interval in milliseconds between empty reads.
    pub poll_interval_ms: u64,
    /// Blocking read timeout in milliseconds (None = non-blocking).
    pub block_timeout_ms: Option<u64>,
    /// Maximum events processed concurrently within a batch.
    pub max_concurrent_events: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_name: std::env::var("USER_EVENTS_STREAM")
                .unwrap_or_else(|_| UserEventStream::STREAM_NAME.to_string()),
            consumer_group: std::env::var("USER_EVENTS_CONSUMER_GROUP")
                .unwrap_or_else(|_| UserEventStream::CONSUMER_GROUP.to_string()),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dlq_stream: std::env::var("NOTIFICATIONS_DLQ_STREAM")
                .unwrap_or_else(|_| UserEventStream::DLQ_STREAM.to_string()),
            batch_size: std::env::var("USER_EVENTS_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            poll_interval_ms: std::env::var("USER_EVENTS_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            // ConnectionManager multiplexes one connection; a blocking
            // XREADGROUP would starve XACK calls from concurrent tasks.
            block_timeout_ms: None,
            max_concurrent_events: std::env::var("USER_EVENTS_MAX_CONCURRENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        }
    }
}

impl ConsumerConfig {
    /// Set the consumer ID.
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the maximum number of concurrently processed events.
    pub fn with_max_concurrent_events(mut self, count: usize) -> Self {
        self.max_concurrent_events = count.max(1);
        self
    }

    /// Set the blocking read timeout (None for non-blocking reads).
    pub fn with_block(mut self, timeout_ms: Option<u64>) -> Self {
        self.block_timeout_ms = timeout_ms;
        self
    }
}

/// Why an event was dropped without delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The payload did not decode into a `UserEvent`.
    MalformedPayload,
    /// The recipient address is syntactically invalid.
    InvalidRecipient,
    /// The event kind is not one this service handles.
    UnknownKind,
    /// Rendering failed; identical input fails identically on retry.
    RenderFailure,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MalformedPayload => "malformed_payload",
            RejectReason::InvalidRecipient => "invalid_recipient",
            RejectReason::UnknownKind => "unknown_kind",
            RejectReason::RenderFailure => "render_failure",
        }
    }
}

/// Decode failures detected before dispatch.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid recipient address: {0:?}")]
    InvalidRecipient(String),
}

/// Decode one stream entry payload into a validated `UserEvent`.
///
/// Unrecognized event kinds decode successfully (classification is the
/// dispatcher's job); malformed JSON and undeliverable addresses do not.
pub fn decode_event(payload: &str) -> Result<UserEvent, DecodeError> {
    let event: UserEvent = serde_json::from_str(payload)?;
    if !event.has_valid_email() {
        return Err(DecodeError::InvalidRecipient(event.email));
    }
    Ok(event)
}

/// Terminal state of one event's dispatch-and-retry sequence.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The notification was sent.
    Succeeded { attempts: u32 },
    /// The event can never be delivered; it is dropped after acknowledgement.
    PermanentlyRejected { reason: RejectReason },
    /// All attempts failed on transient errors; the event goes to the DLQ.
    Exhausted { attempts: u32, error: DispatchError },
    /// Shutdown interrupted a backoff wait. The entry is NOT acknowledged.
    Cancelled,
}

/// Run the dispatch-and-retry sequence for one event.
///
/// Attempts are strictly sequential; the backoff wait between them is a
/// real suspension raced against the shutdown signal.
pub async fn deliver_with_retry(
    service: &DispatchService,
    policy: &RetryPolicy,
    sleep: &dyn Sleep,
    shutdown: &mut watch::Receiver<bool>,
    event: &UserEvent,
) -> DeliveryOutcome {
    let mut attempt: u32 = 1;

    loop {
        match service.dispatch(event).await {
            Ok(()) => return DeliveryOutcome::Succeeded { attempts: attempt },
            Err(DispatchError::UnknownKind) => {
                return DeliveryOutcome::PermanentlyRejected {
                    reason: RejectReason::UnknownKind,
                };
            }
            Err(err) => match policy.evaluate(attempt, &err) {
                RetryDecision::GiveUp => {
                    if err.is_retryable() {
                        return DeliveryOutcome::Exhausted {
                            attempts: attempt,
                            error: err,
                        };
                    }
                    warn!(error = %err, email = %event.email, "Permanent dispatch failure");
                    return DeliveryOutcome::PermanentlyRejected {
                        reason: RejectReason::RenderFailure,
                    };
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        error = %err,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        email = %event.email,
                        "Dispatch failed, retrying after backoff"
                    );
                    metrics::record_retry();

                    let mut wait = sleep.sleep(delay);
                    loop {
                        tokio::select! {
                            _ = &mut wait => break,
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    return DeliveryOutcome::Cancelled;
                                }
                            }
                        }
                    }

                    attempt += 1;
                }
            },
        }
    }
}

/// Consumes user events from the stream and delivers notifications.
pub struct EventConsumer {
    redis: ConnectionManager,
    service: Arc<DispatchService>,
    policy: RetryPolicy,
    sleep: Arc<dyn Sleep>,
    config: ConsumerConfig,
    semaphore: Arc<Semaphore>,
}

impl Clone for EventConsumer {
    fn clone(&self) -> Self {
        Self {
            redis: self.redis.clone(),
            service: Arc::clone(&self.service),
            policy: self.policy.clone(),
            sleep: Arc::clone(&self.sleep),
            config: self.config.clone(),
            semaphore: Arc::clone(&self.semaphore),
        }
    }
}

impl EventConsumer {
    /// Create a new event consumer.
    pub fn new(
        redis: ConnectionManager,
        service: DispatchService,
        policy: RetryPolicy,
        config: ConsumerConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_events.max(1)));
        Self {
            redis,
            service: Arc::new(service),
            policy,
            sleep: Arc::new(TokioSleep),
            config,
            semaphore,
        }
    }

    /// Run the consumer loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> NotificationResult<()> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            provider = %self.service.provider_name(),
            max_concurrent_events = %self.config.max_concurrent_events,
            "Starting event consumer"
        );

        self.ensure_consumer_group().await?;

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut consecutive_errors: u32 = 0;
        const MAX_BACKOFF_SECS: u64 = 30;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping consumer");
                break;
            }

            match self.process_batch(&shutdown).await {
                Ok(()) => {
                    if consecutive_errors > 0 {
                        info!(
                            "Stream connection recovered after {} errors",
                            consecutive_errors
                        );
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;

                    if e.to_string().contains("NOGROUP") {
                        warn!("Consumer group missing, recreating...");
                        if let Err(create_err) = self.ensure_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else {
                        let backoff_secs =
                            std::cmp::min(2u64.pow(consecutive_errors.min(5)), MAX_BACKOFF_SECS);
                        warn!(
                            error = %e,
                            consecutive_errors = %consecutive_errors,
                            backoff_secs = %backoff_secs,
                            "Stream read error, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    }
                    continue;
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Received shutdown signal, stopping consumer");
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("Event consumer stopped");
        Ok(())
    }

    /// Read one batch (own pending entries first, then new ones) and
    /// process every entry as an independent unit of work.
    async fn process_batch(&self, shutdown: &watch::Receiver<bool>) -> RedisResult<()> {
        let pending = self.read_entries("0").await?;
        let new_entries = self.read_entries(">").await?;

        let entries: Vec<(String, String)> = pending.into_iter().chain(new_entries).collect();
        if entries.is_empty() {
            return Ok(());
        }

        debug!(count = entries.len(), "Processing event batch");

        let mut join_set: JoinSet<()> = JoinSet::new();
        for (entry_id, payload) in entries {
            let worker = self.clone();
            let mut shutdown = shutdown.clone();

            join_set.spawn(async move {
                let _permit = worker
                    .semaphore
                    .acquire()
                    .await
                    .expect("Semaphore closed");
                worker
                    .process_entry(&entry_id, &payload, &mut shutdown)
                    .await;
            });
        }

        while join_set.join_next().await.is_some() {}

        Ok(())
    }

    /// Process one stream entry to a terminal state.
    async fn process_entry(
        &self,
        entry_id: &str,
        payload: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let start = std::time::Instant::now();

        let event = match decode_event(payload) {
            Ok(event) => event,
            Err(err) => {
                let reason = match &err {
                    DecodeError::Malformed(_) => RejectReason::MalformedPayload,
                    DecodeError::InvalidRecipient(_) => RejectReason::InvalidRecipient,
                };
                warn!(
                    entry_id = %entry_id,
                    error = %err,
                    reason = reason.as_str(),
                    "Dropping undeliverable event"
                );
                metrics::record_rejected(reason);
                self.finalize_ack(entry_id).await;
                return;
            }
        };

        let outcome = deliver_with_retry(
            &self.service,
            &self.policy,
            self.sleep.as_ref(),
            shutdown,
            &event,
        )
        .await;

        match outcome {
            DeliveryOutcome::Succeeded { attempts } => {
                info!(
                    entry_id = %entry_id,
                    email = %event.email,
                    kind = %event.event_type,
                    attempts = attempts,
                    "Event delivered"
                );
                metrics::record_succeeded(attempts, start.elapsed());
                self.finalize_ack(entry_id).await;
            }
            DeliveryOutcome::PermanentlyRejected { reason } => {
                warn!(
                    entry_id = %entry_id,
                    email = %event.email,
                    kind = %event.event_type,
                    reason = reason.as_str(),
                    "Event permanently rejected"
                );
                metrics::record_rejected(reason);
                self.finalize_ack(entry_id).await;
            }
            DeliveryOutcome::Exhausted { attempts, error } => {
                error!(
                    entry_id = %entry_id,
                    email = %event.email,
                    kind = %event.event_type,
                    attempts = attempts,
                    cause_chain = %error_chain(&error),
                    "Delivery attempts exhausted, moving event to DLQ"
                );
                metrics::record_exhausted(attempts);
                if let Err(dlq_err) = self.push_to_dlq(&event, attempts, &error).await {
                    error!(
                        entry_id = %entry_id,
                        error = %dlq_err,
                        "Failed to append event to DLQ"
                    );
                }
                self.finalize_ack(entry_id).await;
            }
            DeliveryOutcome::Cancelled => {
                // Left unacknowledged on purpose: the group redelivers it
                // after restart.
                info!(
                    entry_id = %entry_id,
                    email = %event.email,
                    "Delivery cancelled by shutdown, leaving entry pending"
                );
            }
        }
    }

    /// Initialize the consumer group if it doesn't exist.
    async fn ensure_consumer_group(&self) -> NotificationResult<()> {
        let mut conn = self.redis.clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read entries via XREADGROUP. Cursor "0" returns this consumer's
    /// pending entries, ">" returns new ones.
    async fn read_entries(&self, cursor: &str) -> RedisResult<Vec<(String, String)>> {
        let mut conn = self.redis.clone();

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id);

        if cursor == ">" {
            if let Some(timeout) = self.config.block_timeout_ms {
                cmd.arg("BLOCK").arg(timeout);
            }
        }

        cmd.arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(cursor);

        type StreamReply = Vec<(String, Vec<(String, Vec<(String, String)>)>)>;
        let reply: Option<StreamReply> = cmd.query_async(&mut conn).await?;

        Ok(reply.map(Self::collect_payloads).unwrap_or_default())
    }

    /// Flatten an XREADGROUP reply into (entry id, payload) pairs.
    fn collect_payloads(
        streams: Vec<(String, Vec<(String, Vec<(String, String)>)>)>,
    ) -> Vec<(String, String)> {
        let mut entries = Vec::new();

        for (_stream, stream_entries) in streams {
            for (entry_id, fields) in stream_entries {
                let payload = fields
                    .into_iter()
                    .find(|(key, _)| key == UserEventStream::EVENT_FIELD)
                    .map(|(_, value)| value)
                    // A missing event field decodes as a malformed payload
                    // downstream, so the entry still gets acknowledged.
                    .unwrap_or_default();
                entries.push((entry_id, payload));
            }
        }

        entries
    }

    /// Acknowledge an entry as consumed.
    async fn ack(&self, entry_id: &str) -> RedisResult<()> {
        let mut conn = self.redis.clone();
        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(entry_id)
            .query_async::<()>(&mut conn)
            .await
    }

    /// Acknowledge, logging instead of propagating: the delivery outcome is
    /// already terminal, so an ack failure only means a redelivery later.
    async fn finalize_ack(&self, entry_id: &str) {
        if let Err(e) = self.ack(entry_id).await {
            error!(entry_id = %entry_id, error = %e, "Failed to acknowledge entry");
        }
    }

    /// Append an exhausted event to the dead letter stream.
    async fn push_to_dlq(
        &self,
        event: &UserEvent,
        attempts: u32,
        error: &DispatchError,
    ) -> NotificationResult<()> {
        let mut conn = self.redis.clone();
        let payload = serde_json::to_string(event)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(UserEventStream::MAX_LENGTH)
            .arg("*")
            .arg(UserEventStream::EVENT_FIELD)
            .arg(&payload)
            .arg("error")
            .arg(error_chain(error))
            .arg("attempts")
            .arg(attempts)
            .arg("consumer")
            .arg(&self.config.consumer_id)
            .query_async::<String>(&mut conn)
            .await?;

        Ok(())
    }
}

/// Format an error with its full source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
