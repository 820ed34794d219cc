//! Prometheus metrics for the notification pipeline.
//!
//! Terminal outcomes are distinct series so an exhausted delivery is never
//! mistaken for a permanent rejection on a dashboard.

use crate::consumer::RejectReason;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus recorder.
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");
        info!("Prometheus metrics initialized");
        handle
    });
}

/// Get the Prometheus handle for rendering metrics.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format.
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Record a delivered event.
pub fn record_succeeded(attempts: u32, duration: Duration) {
    counter!("notifications_processed_total", "outcome" => "succeeded").increment(1);
    histogram!("notification_delivery_attempts").record(attempts as f64);
    histogram!("notification_delivery_duration_seconds").record(duration.as_secs_f64());
}

/// Record a permanently rejected event.
pub fn record_rejected(reason: RejectReason) {
    counter!(
        "notifications_processed_total",
        "outcome" => "permanently_rejected",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record an event whose delivery attempts were exhausted.
pub fn record_exhausted(attempts: u32) {
    counter!("notifications_processed_total", "outcome" => "exhausted").increment(1);
    histogram!("notification_delivery_attempts").record(attempts as f64);
}

/// Record one scheduled retry.
pub fn record_retry() {
    counter!("notification_retries_total").increment(1);
}
