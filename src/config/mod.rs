//! Configuration loading.
//!
//! Settings come from an optional `config/default.*` file layered under
//! `H2B__`-prefixed environment variables, then get merged over the defaults.

mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BackendConfig, ServerSettings, SessionSettings, Settings};

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit base file name (extension optional).
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("H2B")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    Ok(Settings {
        server: ServerSettings {
            host: partial
                .server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: partial
                .server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
            log_level: partial
                .server
                .as_ref()
                .and_then(|s| s.log_level.clone())
                .unwrap_or(default.server.log_level),
            max_chunk_bytes: partial
                .server
                .as_ref()
                .and_then(|s| s.max_chunk_bytes)
                .filter(|n| *n > 0)
                .unwrap_or(default.server.max_chunk_bytes),
        },
        session: SessionSettings {
            cookie_name: partial
                .session
                .as_ref()
                .and_then(|s| s.cookie_name.clone())
                .unwrap_or(default.session.cookie_name),
            cookie_ttl_secs: partial
                .session
                .as_ref()
                .and_then(|s| s.cookie_ttl_secs)
                .unwrap_or(default.session.cookie_ttl_secs),
        },
        backends: partial.backends.unwrap_or(default.backends),
    })
}
