//! Connection lifecycle as an explicit state machine.
//!
//! ```text
//! Disconnected --ConnectAttempt--> Connecting --ConnectSucceeded--> Connected
//!      ^                              |                                |
//!      +-------ConnectFailed----------+                                |
//!      +-------ConnectionClosed----------------------------------------+
//!
//! any non-terminal --ShutdownRequested--> Closing --ShutdownComplete--> Closed
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectAttempt,
    ConnectSucceeded,
    ConnectFailed(String),
    ConnectionClosed(String),
    ShutdownRequested,
    ShutdownComplete,
}

impl ConnectionState {
    /// The state reached by applying `event`, or `None` when the event does
    /// not apply in this state.
    pub fn on(self, event: &ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (S::Disconnected, E::ConnectAttempt) => Some(S::Connecting),
            (S::Connecting, E::ConnectSucceeded) => Some(S::Connected),
            (S::Connecting, E::ConnectFailed(_)) => Some(S::Disconnected),
            (S::Connected, E::ConnectionClosed(_)) => Some(S::Disconnected),
            (S::Disconnected | S::Connecting | S::Connected, E::ShutdownRequested) => {
                Some(S::Closing)
            }
            (S::Closing, E::ShutdownComplete) => Some(S::Closed),
            _ => None,
        }
    }

    /// `Closing` and `Closed` never lead back to a connection.
    pub fn is_shutting_down(self) -> bool {
        matches!(self, ConnectionState::Closing | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Snapshot published to observers on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Most recent connect failure or close reason.
    pub last_error: Option<String>,
    /// Number of connection attempts started so far.
    pub attempts: u64,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            attempts: 0,
        }
    }
}
