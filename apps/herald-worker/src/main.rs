//! Notification Worker Service - Entry Point
//!
//! Background worker that delivers emails for user lifecycle events read
//! from the Redis stream.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    herald_worker::run().await
}
