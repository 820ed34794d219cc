//! Publish a sample user event to the stream.
//!
//! Run with: cargo run -p herald_worker --bin publish_test_event

use domain_notifications::{streams, EventKind, UserEvent};
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let redis_url = std::env::var("REDIS_URL")
        .or_else(|_| std::env::var("REDIS_HOST"))
        .unwrap_or_else(|_| "redis://localhost:6379".to_string());

    println!("Connecting to Redis at {}", redis_url);

    let client = redis::Client::open(redis_url.as_str())?;
    let redis = redis::aio::ConnectionManager::new(client).await?;

    // Test PING
    let mut conn = redis.clone();
    let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    println!("Redis PING: {}", pong);

    let event = UserEvent {
        event_type: EventKind::UserCreated,
        email: std::env::args()
            .nth(1)
            .unwrap_or_else(|| "test@example.com".to_string()),
        name: Some("Test User".to_string()),
        id: None,
    };

    println!("Publishing event for: {}", event.email);

    let stream_id = streams::publish_event(&redis, &event).await?;

    println!("Event published successfully!");
    println!("Stream ID: {}", stream_id);

    Ok(())
}
