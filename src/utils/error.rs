//! Process-level errors.
//!
//! Request-path failures are typed by the gateway (`GatewayError`) and the
//! HTTP layer (`ApiError`); broker failures stay inside the connection
//! manager. What remains here is what can stop the process from starting
//! or serving: bad configuration and socket I/O.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
