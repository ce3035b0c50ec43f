//! Message bus operations.
//!
//! This module provides:
//! - The [`EventBus`] capability used to emit events for other services
//! - Outbound message types
//! - The RabbitMQ publisher backing it in production
//!
//! ## Topology
//!
//! ```text
//! Webhook Dispatcher → payments.events (topic exchange) → payment.succeeded → consumers
//! ```

pub mod publisher;
pub mod types;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

pub use publisher::Publisher;
pub use types::{PaymentSucceeded, PAYMENT_SUCCEEDED};

/// Something that can put an event on the bus.
///
/// `emit` returns once the broker has taken the message or the attempt has
/// failed; it never retries.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn emit(&self, topic: &str, body: Vec<u8>) -> Result<()>;
}

/// Serialize `message` as JSON and emit it under `topic`.
pub async fn emit_json<T: Serialize + Sync>(
    bus: &dyn EventBus,
    topic: &str,
    message: &T,
) -> Result<()> {
    let body = serde_json::to_vec(message).context("Failed to serialize event")?;
    bus.emit(topic, body).await
}
