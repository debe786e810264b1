//! Redis pub/sub broker
//!
//! Publishes enriched and dead-lettered records, and opens the subscription
//! stream the dispatcher consumes.

use crate::error::{Result, WorkerError};
use crate::pubsub::events::{DeadLetterEvent, PhotoMetadata};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionInfo};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outbound side of the broker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a raw payload, returning the number of subscribers that received it
    async fn publish(&self, channel: &str, payload: String) -> Result<usize>;
}

/// Shared publisher handle
pub type SharedPublisher = Arc<dyn Publisher>;

/// Publish an enriched record
pub async fn publish_metadata(
    publisher: &dyn Publisher,
    channel: &str,
    metadata: &PhotoMetadata,
) -> Result<usize> {
    let payload = metadata
        .to_payload()
        .map_err(|e| WorkerError::Publish(format!("failed to encode record: {}", e)))?;
    publisher.publish(channel, payload).await
}

/// Send a failed record to the dead-letter channel
pub async fn send_to_dead_letter(
    publisher: &dyn Publisher,
    dead_letter_channel: &str,
    event: &DeadLetterEvent,
) -> Result<usize> {
    let payload = serde_json::to_string(event)
        .map_err(|e| WorkerError::Publish(format!("failed to encode dead letter: {}", e)))?;

    let receivers = publisher.publish(dead_letter_channel, payload).await?;

    warn!(
        photo_id = %event.original_event.photo_id,
        source_channel = %event.source_channel,
        error = %event.error,
        "Sent record to dead-letter channel"
    );

    Ok(receivers)
}

/// Redis-backed broker client
#[derive(Clone)]
pub struct RedisBroker {
    client: Client,
    connection: ConnectionManager,
}

impl RedisBroker {
    /// Connect to Redis
    pub async fn connect(info: ConnectionInfo) -> Result<Self> {
        let client = Client::open(info)?;
        let connection = ConnectionManager::new(client.clone()).await?;

        Ok(Self { client, connection })
    }

    /// Command connection, shared with the keyed store
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Check the server is reachable
    pub async fn ping(&self) -> Result<String> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong)
    }

    /// Subscribe to a channel and stream message payloads
    ///
    /// Fails if the subscription is not confirmed within `confirm_timeout`.
    /// Messages whose payload is not a string are logged and skipped.
    pub async fn subscribe(
        &self,
        channel: &str,
        confirm_timeout: Duration,
    ) -> Result<BoxStream<'static, String>> {
        let mut pubsub = self.client.get_async_pubsub().await?;

        tokio::time::timeout(confirm_timeout, pubsub.subscribe(channel))
            .await
            .map_err(|_| WorkerError::Timeout {
                operation: "channel subscription",
                after: confirm_timeout,
            })??;

        info!(channel = %channel, "Subscribed to channel");

        let channel = channel.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let payload = match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    error!(channel = %channel, error = ?e, "Failed to get message payload");
                    None
                }
            };
            futures::future::ready(payload)
        });

        Ok(stream.boxed())
    }
}

#[async_trait]
impl Publisher for RedisBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let mut conn = self.connection.clone();
        let receivers: usize = conn
            .publish(channel, payload)
            .await
            .map_err(|e| WorkerError::Publish(e.to_string()))?;

        debug!(channel = %channel, receivers = receivers, "Published message");
        Ok(receivers)
    }
}
