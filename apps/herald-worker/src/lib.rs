//! Notification Worker Service
//!
//! A background worker that delivers emails for user lifecycle events from
//! a Redis stream.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (users:events)
//!   ↓ (Consumer Group: notification_workers)
//! EventConsumer
//!   ↓ (classifies + retries with backoff)
//! DispatchService
//!   ↓ (renders templates)
//! TemplateEngine (Handlebars)
//!   ↓ (sends emails)
//! EmailProvider (SendGrid/SMTP)
//! ```
//!
//! ## Features
//!
//! - Consumer group support for horizontal scaling
//! - Bounded retry with exponential backoff for transient transport faults
//! - Dead letter stream for events that exhaust their retries
//! - Graceful shutdown handling
//! - Health and metrics endpoints for probes and scraping

mod health;

use core_config::redis::RedisConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{app_info, env_or_default, env_required, Environment, FromEnv};
use domain_notifications::{
    metrics, ConsumerConfig, DispatchService, EmailProvider, EventConsumer, RetryPolicy,
    SendGridProvider, SmtpProvider, TemplateEngine,
};
use eyre::{Result, WrapErr};
use health::HealthState;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Worker settings loaded once at startup.
#[derive(Debug, Clone)]
struct WorkerSettings {
    redis: RedisConfig,
    site_url: String,
    health_port: u16,
}

impl WorkerSettings {
    fn from_env(environment: &Environment) -> Result<Self> {
        let redis = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;

        // The site identifier is part of the message content, so a production
        // worker without it must not start.
        let site_url = match environment {
            Environment::Production => env_required("APP_SITE_URL")?,
            Environment::Development => {
                env_or_default("APP_SITE_URL", "http://localhost:3000")
            }
        };

        // Checks WORKER_HEALTH_PORT first, then HEALTH_PORT, then default.
        // Note: Do NOT use PORT as fallback - that's typically the main API's.
        let health_port = std::env::var("WORKER_HEALTH_PORT")
            .or_else(|_| std::env::var("HEALTH_PORT"))
            .unwrap_or_else(|_| "8081".to_string())
            .parse()
            .unwrap_or(8081);

        Ok(Self {
            redis,
            site_url,
            health_port,
        })
    }
}

/// Connect to Redis with exponential backoff between attempts.
async fn connect_with_retry(url: &str, max_attempts: u32) -> Result<ConnectionManager> {
    let mut delay = Duration::from_millis(500);
    let mut attempt: u32 = 1;

    loop {
        match connect(url).await {
            Ok(manager) => return Ok(manager),
            Err(e) if attempt < max_attempts => {
                warn!(
                    attempt = attempt,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Redis connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e).wrap_err("Failed to connect to Redis"),
        }
    }
}

async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    // Verify the connection with PING
    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    Ok(manager)
}

/// Run the notification worker.
///
/// This is the main entry point for the worker. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Connects to Redis with retry logic
/// 3. Selects the email provider (SendGrid for prod, SMTP for dev)
/// 4. Starts the consumer with graceful shutdown handling
///
/// # Errors
///
/// Returns an error if required configuration is missing, the Redis
/// connection cannot be established, the provider cannot be built, or the
/// consumer hits a fatal error.
pub async fn run() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment);
    metrics::init_metrics();

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting notification worker");
    info!("Environment: {:?}", environment);

    let settings = WorkerSettings::from_env(&environment)?;

    info!("Connecting to Redis...");
    let redis = connect_with_retry(&settings.redis.url, 5).await?;
    info!("Connected to Redis successfully");

    let templates = TemplateEngine::new(settings.site_url.clone())
        .wrap_err("Failed to initialize template engine")?;

    let provider: Arc<dyn EmailProvider> = match environment {
        Environment::Production => {
            info!("Using SendGrid provider for production");
            Arc::new(SendGridProvider::from_env().wrap_err(
                "SendGrid configuration error. Ensure SENDGRID_API_KEY and SENDGRID_FROM_EMAIL are set",
            )?)
        }
        Environment::Development => {
            info!("Using SMTP provider for development (Mailpit/MailHog)");
            Arc::new(
                SmtpProvider::mailhog()
                    .wrap_err("SMTP configuration error. Ensure SMTP_HOST and SMTP_PORT are accessible")?,
            )
        }
    };

    let service = DispatchService::new(provider, Arc::new(templates));
    let consumer_config = ConsumerConfig::default();
    info!(
        stream = %consumer_config.stream_name,
        consumer_group = %consumer_config.consumer_group,
        consumer_id = %consumer_config.consumer_id,
        poll_interval_ms = %consumer_config.poll_interval_ms,
        "Consumer configuration loaded"
    );

    // Set up the shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Start the health and metrics server in the background
    let health_state = HealthState {
        redis: redis.clone(),
        app: app_info,
        stream_name: consumer_config.stream_name.clone(),
    };
    let health_port = settings.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    let consumer = EventConsumer::new(redis, service, RetryPolicy::default(), consumer_config);
    consumer.run(shutdown_rx).await?;

    info!("Notification worker stopped");
    Ok(())
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
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_site_url_in_development() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://localhost:6379")),
                ("APP_SITE_URL", None::<&str>),
            ],
            || {
                let settings = WorkerSettings::from_env(&Environment::Development).unwrap();
                assert_eq!(settings.site_url, "http://localhost:3000");
                assert_eq!(settings.health_port, 8081);
            },
        );
    }

    #[test]
    fn test_settings_require_site_url_in_production() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://localhost:6379")),
                ("APP_SITE_URL", None::<&str>),
            ],
            || {
                let result = WorkerSettings::from_env(&Environment::Production);
                assert!(result.is_err());
                assert!(result.unwrap_err().to_string().contains("APP_SITE_URL"));
            },
        );
    }

    #[test]
    fn test_settings_require_redis() {
        temp_env::with_vars(
            [("REDIS_URL", None::<&str>), ("REDIS_HOST", None::<&str>)],
            || {
                let result = WorkerSettings::from_env(&Environment::Development);
                assert!(result.is_err());
            },
        );
    }
}
