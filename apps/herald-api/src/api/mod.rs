pub mod health;
pub mod notifications;

use crate::state::AppState;
use axum::{routing::get, Router};

/// Build the API router with all routes and state applied.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/notifications", notifications::router())
        .route("/health", get(health::health))
        .with_state(state)
}
