//! Health and metrics endpoints for the worker.
//!
//! Provides:
//! - Liveness probe: `/health`
//! - Readiness probe: `/ready` (verifies the Redis connection)
//! - Prometheus metrics: `/metrics`

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use core_config::AppInfo;
use domain_notifications::metrics;
use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state for the health endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub redis: ConnectionManager,
    pub app: AppInfo,
    pub stream_name: String,
}

/// Build the health router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Bind and serve the health router on the given port.
pub async fn serve(state: HealthState, port: u16) -> Result<()> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health and metrics server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Liveness: always 200 while the process runs.
async fn health(State(state): State<HealthState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "name": state.app.name,
            "version": state.app.version,
        })),
    )
        .into_response()
}

/// Readiness: verifies the Redis connection with a PING.
async fn ready(State(state): State<HealthState>) -> Response {
    let mut conn = state.redis.clone();
    match redis::cmd("PING").query_async::<String>(&mut conn).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "redis": "connected",
                "stream": state.stream_name,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not ready",
                    "redis": "disconnected",
                })),
            )
                .into_response()
        }
    }
}

/// Prometheus metrics in text exposition format.
async fn metrics_handler() -> String {
    metrics::render_metrics()
}
