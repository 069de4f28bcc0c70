use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the relay.
///
/// Includes settings for the HTTP server, the broker connection and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the HTTP server.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker connection.
///
/// The retry delay is fixed: every failed or closed connection is retried
/// after exactly this long, forever.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub url: String,
    pub retry_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub operation_timeout_ms: u64,
}

impl BrokerSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
    pub retry_delay_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fill every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let logging = self.logging;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(defaults.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(defaults.server.port),
            },
            broker: BrokerSettings {
                url: broker
                    .as_ref()
                    .and_then(|b| b.url.clone())
                    .unwrap_or(defaults.broker.url),
                retry_delay_ms: broker
                    .as_ref()
                    .and_then(|b| b.retry_delay_ms)
                    .unwrap_or(defaults.broker.retry_delay_ms),
                connect_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.connect_timeout_ms)
                    .unwrap_or(defaults.broker.connect_timeout_ms),
                operation_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.operation_timeout_ms)
                    .unwrap_or(defaults.broker.operation_timeout_ms),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(defaults.logging.level),
            },
        }
    }
}

/// Provides default values for `Settings`.
///
/// Matches the reference deployment: port 3000 and a broker on localhost.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            broker: BrokerSettings {
                url: "amqp://localhost:5672".to_string(),
                retry_delay_ms: 5_000,
                connect_timeout_ms: 10_000,
                operation_timeout_ms: 5_000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
