//! The `connection` module owns the lifecycle of the broker connection.
//!
//! [`ConnectionManager`] runs independently of request handling: it keeps
//! one channel open when the broker allows it and retries in the
//! background when it does not. The only thing it exposes to the rest of
//! the relay is [`ConnectionManager::current_channel`].

pub mod manager;
pub mod state;

pub use manager::ConnectionManager;
pub use state::{ConnectionEvent, ConnectionState, ConnectionStatus};
