//! Async RabbitMQ publisher for outbound events.
//!
//! The publisher keeps one connection and channel, shared across all
//! request handlers, and reconnects lazily when the channel drops.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::EventBus;

/// Async RabbitMQ publisher with connection management.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    servers: Vec<String>,
    exchange: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    /// Create a publisher for `exchange`, connecting to the first reachable server.
    pub fn new(servers: Vec<String>, exchange: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                servers,
                exchange: exchange.into(),
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        let conn = connect_any(&self.inner.servers).await?;

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.exchange_declare(
            &self.inner.exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare events exchange")?;

        info!(exchange = %self.inner.exchange, "rabbitmq_exchange_declared");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}

#[async_trait]
impl EventBus for Publisher {
    async fn emit(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        let channel = self.ensure_connected().await?;

        channel
            .basic_publish(
                &self.inner.exchange,
                topic,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .context("Failed to publish event")?
            .await
            .context("Failed to confirm publish")?;

        info!(
            exchange = %self.inner.exchange,
            topic = topic,
            body_length = body.len(),
            "rabbitmq_event_published"
        );

        Ok(())
    }
}

/// Connect to the first server in `servers` that accepts a connection.
pub async fn connect_any(servers: &[String]) -> Result<Connection> {
    let mut last_error = None;

    for (index, url) in servers.iter().enumerate() {
        info!(server_index = index, "rabbitmq_connecting");

        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(conn) => {
                info!(server_index = index, "rabbitmq_connected");
                return Ok(conn);
            }
            Err(e) => {
                warn!(server_index = index, error = %e, "rabbitmq_connect_failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e).context("Failed to connect to RabbitMQ"),
        None => Err(anyhow!("No RabbitMQ servers configured")),
    }
}
