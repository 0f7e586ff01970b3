//! Record publishing to an AMQP exchange.
//!
//! Each job opens exactly one connection and one channel to the broker named
//! in its parameters, publishes every [`ArticleRecord`] on that channel, and
//! closes both when the job ends. The channel is shared by all article tasks
//! of the job; `lapin` channels are safe to publish on concurrently.
//!
//! # Message format
//!
//! | Property | Value |
//! |----------|-------|
//! | Exchange | `consent.direct` (configurable) |
//! | Routing key | `datain` (configurable) |
//! | Content type | `text/json` |
//! | Body | JSON-encoded [`ArticleRecord`] |
//!
//! The sink itself does not time out; the fan-out executor bounds each call.

use crate::error::PublishError;
use crate::models::ArticleRecord;
use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, info, instrument, warn};

const CONTENT_TYPE: &str = "text/json";

/// Reply code sent with a normal channel/connection close.
const REPLY_SUCCESS: u16 = 200;

/// Destination for published records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Publish one record.
    async fn publish(&self, record: &ArticleRecord) -> Result<(), PublishError>;

    /// Release the sink's connection. Called once, when the job ends.
    async fn close(&self) {}
}

/// A [`RecordSink`] backed by one AMQP connection and channel.
pub struct AmqpSink {
    connection: Connection,
    channel: Channel,
    exchange: String,
    routing_key: String,
}

impl AmqpSink {
    /// Connect to `endpoint` and open the job's channel.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Broker`] if the broker cannot be reached or
    /// refuses the channel.
    #[instrument(level = "info", skip_all, fields(%exchange, %routing_key))]
    pub async fn connect(
        endpoint: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<Self, PublishError> {
        let connection = Connection::connect(endpoint, ConnectionProperties::default()).await?;
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close(REPLY_SUCCESS, "channel failed").await {
                    warn!(error = %close_err, "Failed to close connection after channel error");
                }
                return Err(e.into());
            }
        };
        info!("Connected to broker");

        Ok(Self {
            connection,
            channel,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        })
    }
}

#[async_trait]
impl RecordSink for AmqpSink {
    #[instrument(level = "debug", skip_all, fields(link = %record.link))]
    async fn publish(&self, record: &ArticleRecord) -> Result<(), PublishError> {
        let payload = record.to_payload()?;
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type(CONTENT_TYPE.into()),
            )
            .await?;
        confirm.await?;
        debug!(bytes = payload.len(), "Published record");
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "job finished").await {
            warn!(error = %e, "Failed to close channel");
        }
        if let Err(e) = self.connection.close(REPLY_SUCCESS, "job finished").await {
            warn!(error = %e, "Failed to close connection");
        }
        info!("Closed broker connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_rejects_unparseable_endpoint() {
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            AmqpSink::connect("definitely not an amqp uri", "consent.direct", "datain"),
        )
        .await
        .expect("connect should fail fast");
        assert!(matches!(result, Err(PublishError::Broker(_))));
    }
}
