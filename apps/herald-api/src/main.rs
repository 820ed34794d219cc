//! Notification API - Entry Point
//!
//! HTTP surface for manually triggering email notifications. Thin adapter
//! over the same dispatch core used by the stream worker.

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::Environment;
use domain_notifications::{
    DispatchService, EmailProvider, SendGridProvider, SmtpProvider, TemplateEngine,
};
use eyre::WrapErr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod config;
mod error;
mod extractors;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output
    install_color_eyre();

    // Load configuration from environment variables
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.environment);

    let templates = TemplateEngine::new(config.site_url.clone())
        .wrap_err("Failed to initialize template engine")?;

    let provider: Arc<dyn EmailProvider> = match config.environment {
        Environment::Production => {
            info!("Using SendGrid provider for production");
            Arc::new(SendGridProvider::from_env().wrap_err(
                "SendGrid configuration error. Ensure SENDGRID_API_KEY and SENDGRID_FROM_EMAIL are set",
            )?)
        }
        Environment::Development => {
            info!("Using SMTP provider for development (Mailpit/MailHog)");
            Arc::new(SmtpProvider::mailhog().wrap_err("SMTP configuration error")?)
        }
    };

    let state = AppState {
        dispatch: Arc::new(DispatchService::new(provider, Arc::new(templates))),
        app: config.app,
    };

    let app = Router::new()
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .merge(api::routes(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&config)?);

    let listener = TcpListener::bind(config.server.address())
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", config.server.address()))?;

    info!("Server starting on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server error")?;

    info!("Notification API shutdown complete");
    Ok(())
}

/// Build the CORS layer: explicit origin allow-list when configured
/// (required in production), permissive otherwise.
fn cors_layer(config: &Config) -> eyre::Result<CorsLayer> {
    let Some(origins_str) = &config.cors_allowed_origins else {
        return Ok(CorsLayer::permissive());
    };

    let allowed_origins: Vec<HeaderValue> = origins_str
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("Invalid CORS_ALLOWED_ORIGIN value")?;

    if allowed_origins.is_empty() {
        eyre::bail!("CORS_ALLOWED_ORIGIN cannot be empty");
    }

    info!("CORS configured with allowed origins: {}", origins_str);

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            HeaderName::from_static("x-csrf-token"),
        ])
        .max_age(Duration::from_secs(3600)))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully");
        },
    }
}
