//! RabbitMQ (AMQP 0-9-1) implementation of the broker traits, backed by `lapin`.

use std::sync::Arc;

use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicGetOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    BrokerChannel, BrokerConnector, BrokerError, BrokerSession, CloseSignal, Delivery, QueueSpec,
};

/// AMQP delivery mode for messages written to disk by the broker.
const PERSISTENT: u8 = 2;

const REPLY_SUCCESS: u16 = 200;

/// Opens `lapin` connections to a single broker URL.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    url: String,
}

impl AmqpConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> Result<BrokerSession, BrokerError> {
        // Unique per attempt so sessions can be told apart in the management UI.
        let name = format!("relayq-{}", Uuid::new_v4());
        // Drive lapin's I/O and callbacks on the process's tokio runtime.
        let properties = ConnectionProperties::default()
            .with_connection_name(name.clone().into())
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = Connection::connect(&self.url, properties)
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        let (mut notifier, closed) = CloseSignal::pair();
        connection.on_error(move |err| notifier.notify(err.to_string()));

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(REPLY_SUCCESS, "channel open failed").await;
                return Err(BrokerError::Connect(e.to_string()));
            }
        };

        debug!(connection = %name, channel = channel.id(), "AMQP channel opened");

        Ok(BrokerSession {
            channel: Arc::new(AmqpChannel {
                connection,
                channel,
            }),
            closed,
        })
    }
}

/// A `lapin` channel together with the connection that owns it.
pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

impl AmqpChannel {
    /// An error on a channel that is no longer usable means the session was
    /// invalidated underneath the caller.
    fn classify(&self, err: lapin::Error) -> BrokerError {
        if self.is_open() {
            BrokerError::Protocol(err.to_string())
        } else {
            BrokerError::ChannelClosed
        }
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare_queue(&self, queue: &QueueSpec) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: queue.durable,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(&queue.name, options, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|e| self.classify(e))
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        persistent: bool,
    ) -> Result<(), BrokerError> {
        let mut properties = BasicProperties::default();
        if persistent {
            properties = properties.with_delivery_mode(PERSISTENT);
        }

        // No publisher confirm is awaited.
        self.channel
            .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
            .await
            .map(|_confirm| ())
            .map_err(|e| self.classify(e))
    }

    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let message = self
            .channel
            .basic_get(queue, BasicGetOptions { no_ack: false })
            .await
            .map_err(|e| self.classify(e))?;

        Ok(message.map(|m| Delivery {
            delivery_tag: m.delivery.delivery_tag,
            data: m.delivery.data,
        }))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| self.classify(e))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.channel.status().connected() {
            self.channel
                .close(REPLY_SUCCESS, "relay shutting down")
                .await
                .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        }
        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(REPLY_SUCCESS, "relay shutting down").await {
                warn!(error = %e, "AMQP connection close failed after channel close");
            }
        }
        Ok(())
    }
}
