//! Configuration loading for the relay.
//!
//! Values are layered, later sources winning: built-in defaults, an
//! optional config file, `RELAYQ_`-prefixed environment variables, and
//! finally the deployment variables `PORT` and `RABBITMQ_URL`.

mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, ServerSettings, Settings};

/// Config file looked up when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new(DEFAULT_CONFIG_FILE))
}

/// Loads the configuration using `path` as the (optional) config file and
/// merges the result with default values.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("RELAYQ")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("server.port", std::env::var("PORT").ok())?
        .set_override_option("broker.url", std::env::var("RABBITMQ_URL").ok())?;

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
