//! The `gateway` module wraps the active broker channel with the relay's
//! domain operations: publish a message and take one pending message.

pub mod error;
pub mod message;
pub mod queue;

pub use error::GatewayError;
pub use message::RelayMessage;
pub use queue::QueueGateway;
