//! Queue gateway
//!
//! Domain operations over whatever channel the connection manager currently
//! holds. The channel is looked up once per call and never kept; if it goes
//! away mid-call the result is `Unavailable`, not a panic.
//!
//! Delivery note: `take_one` acknowledges a message as soon as it has been
//! fetched, before the HTTP response reaches the caller. A crash in between
//! loses that message. If the ack itself fails, the channel is withdrawn so
//! the reconnect returns the message to the queue.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::broker::BrokerError;
use crate::connection::ConnectionManager;

use super::error::GatewayError;
use super::message::RelayMessage;

#[derive(Debug, Clone)]
pub struct QueueGateway {
    connections: Arc<ConnectionManager>,
    op_timeout: Duration,
}

impl QueueGateway {
    pub fn new(connections: Arc<ConnectionManager>, op_timeout: Duration) -> Self {
        Self {
            connections,
            op_timeout,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Enqueue `body` as a persistent, server-timestamped `RelayMessage`.
    ///
    /// Returns once the broker client has accepted the message; no publisher
    /// confirm is awaited.
    pub async fn publish(&self, body: &str) -> Result<(), GatewayError> {
        if body.is_empty() {
            return Err(GatewayError::InvalidInput("message is required"));
        }

        let channel = self
            .connections
            .current_channel()
            .ok_or(GatewayError::Unavailable)?;

        let payload = serde_json::to_vec(&RelayMessage::new(body))?;
        let queue = &self.connections.queue().name;

        self.bounded(channel.publish(queue, &payload, true)).await?;
        debug!(queue = %queue, bytes = payload.len(), "Message published");
        Ok(())
    }

    /// Fetch and acknowledge at most one pending message.
    pub async fn take_one(&self) -> Result<Option<RelayMessage>, GatewayError> {
        let channel = self
            .connections
            .current_channel()
            .ok_or(GatewayError::Unavailable)?;
        let queue = &self.connections.queue().name;

        let Some(delivery) = self.bounded(channel.get(queue)).await? else {
            return Ok(None);
        };

        if let Err(e) = self.bounded(channel.ack(delivery.delivery_tag)).await {
            // An unacked delivery is only redelivered once its channel closes.
            warn!(
                delivery_tag = delivery.delivery_tag,
                error = %e,
                "Ack failed, recycling broker channel"
            );
            self.connections.invalidate(&channel, "ack failed");
            return Err(e);
        }

        match serde_json::from_slice::<RelayMessage>(&delivery.data) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Dropped malformed message from queue"
                );
                Err(e.into())
            }
        }
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, BrokerError>>,
    ) -> Result<T, GatewayError> {
        match timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(BrokerError::Timeout.into()),
        }
    }
}
