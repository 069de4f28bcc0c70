use thiserror::Error;

use crate::broker::BrokerError;

/// Typed outcome of a gateway operation.
///
/// The HTTP layer maps these one-to-one onto status codes, so every variant
/// must be unambiguous about whether the caller can retry.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Caller data failed a precondition. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// No live broker channel right now. Heals once the connection
    /// manager reconnects.
    #[error("message service unavailable")]
    Unavailable,

    #[error("broker error: {0}")]
    Broker(#[source] BrokerError),

    #[error("malformed queue payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GatewayError::Unavailable)
    }
}

impl From<BrokerError> for GatewayError {
    fn from(err: BrokerError) -> Self {
        match err {
            // channel invalidated mid-operation, or the broker stopped answering
            BrokerError::ChannelClosed | BrokerError::Timeout => GatewayError::Unavailable,
            other => GatewayError::Broker(other),
        }
    }
}
