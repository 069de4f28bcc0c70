//! Broker capability set.
//!
//! The relay never talks to a broker client library directly. The
//! connection manager opens sessions through a [`BrokerConnector`], and the
//! gateway moves messages through the [`BrokerChannel`] of the current
//! session. `amqp` provides the RabbitMQ implementation; tests use the
//! in-memory broker in `memory`.

pub mod amqp;
#[cfg(test)]
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

pub use amqp::AmqpConnector;

/// Name of the queue every message goes through.
pub const QUEUE_NAME: &str = "messages";

/// A named destination and its durability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
}

impl QueueSpec {
    /// The durable `messages` queue used by the relay.
    pub fn relay() -> Self {
        Self {
            name: QUEUE_NAME.to_string(),
            durable: true,
        }
    }
}

/// A message fetched with manual acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("channel is closed")]
    ChannelClosed,

    #[error("broker operation timed out")]
    Timeout,

    #[error("broker protocol error: {0}")]
    Protocol(String),
}

/// Opens sessions to a broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// Open a connection and a channel on it.
    async fn connect(&self) -> Result<BrokerSession, BrokerError>;
}

/// A logical session used to declare queues and move messages.
///
/// Implementations must be cheap to share: the connection manager hands out
/// `Arc<dyn BrokerChannel>` clones to every request.
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    fn is_open(&self) -> bool;

    /// Declare `queue`; a no-op when it already exists with the same durability.
    async fn declare_queue(&self, queue: &QueueSpec) -> Result<(), BrokerError>;

    /// Enqueue `payload`. Persistent messages survive a broker restart.
    async fn publish(&self, queue: &str, payload: &[u8], persistent: bool)
    -> Result<(), BrokerError>;

    /// Fetch at most one message in manual acknowledgement mode.
    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// An open channel plus the signal that fires when its connection goes away.
pub struct BrokerSession {
    pub channel: Arc<dyn BrokerChannel>,
    pub closed: CloseSignal,
}

/// Resolves with a reason once the underlying connection is closed by the
/// broker or the network.
#[derive(Debug)]
pub struct CloseSignal(oneshot::Receiver<String>);

/// Sending half of a [`CloseSignal`]. Firing it more than once is harmless.
#[derive(Debug)]
pub struct CloseNotifier(Option<oneshot::Sender<String>>);

impl CloseSignal {
    pub fn pair() -> (CloseNotifier, CloseSignal) {
        let (tx, rx) = oneshot::channel();
        (CloseNotifier(Some(tx)), CloseSignal(rx))
    }

    pub async fn wait(self) -> String {
        // A dropped notifier means the connection object itself is gone.
        self.0
            .await
            .unwrap_or_else(|_| "connection dropped".to_string())
    }
}

impl CloseNotifier {
    pub fn notify(&mut self, reason: impl Into<String>) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(reason.into());
        }
    }
}
