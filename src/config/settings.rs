use std::collections::BTreeMap;

use serde::Deserialize;

use crate::backend::BackendKind;

/// Top-level configuration settings for the gateway.
///
/// Includes the HTTP listener, session cookie handling and one entry per
/// configured broker backend.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub backends: BTreeMap<String, BackendConfig>,
}

/// Configuration settings for the HTTP listener.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Upper bound on the bytes handed out by one pull of a response body.
    pub max_chunk_bytes: usize,
}

/// Session cookie handling.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub cookie_ttl_secs: u64,
}

/// Connection parameters for one broker backend.
///
/// Immutable once loaded. Only the fields relevant to `kind` are read; the
/// rest keep their defaults.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_virtual_host")]
    pub virtual_host: String,
    /// Full broker URL; takes precedence over host/port where the broker
    /// client accepts one (NATS, Redis, MQTT).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub exchange_name: Option<String>,
    #[serde(default = "default_exchange_type")]
    pub exchange_type: String,
    /// Idle expiry for per-subscription queues, in milliseconds.
    #[serde(default)]
    pub queue_ttl_ms: Option<u32>,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Fixed topic pattern; overrides the pattern carried by the request path.
    #[serde(default)]
    pub subscription: Option<String>,
    /// Routing key used when a POST carries none.
    #[serde(default)]
    pub publish_topic: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_virtual_host() -> String {
    "/".to_string()
}

fn default_exchange_type() -> String {
    "topic".to_string()
}

fn default_keepalive_secs() -> u64 {
    5
}

impl BackendConfig {
    /// A config of the given kind with every other field defaulted.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            host: default_host(),
            port: None,
            username: None,
            password: None,
            virtual_host: default_virtual_host(),
            url: None,
            exchange_name: None,
            exchange_type: default_exchange_type(),
            queue_ttl_ms: None,
            keepalive_secs: default_keepalive_secs(),
            subscription: None,
            publish_topic: None,
        }
    }

    /// Exchange to bind and publish to; `amq.<type>` unless configured.
    pub fn exchange_name(&self) -> String {
        self.exchange_name
            .clone()
            .unwrap_or_else(|| format!("amq.{}", self.exchange_type))
    }

    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub session: Option<PartialSessionSettings>,
    pub backends: Option<BTreeMap<String, BackendConfig>>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub max_chunk_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialSessionSettings {
    pub cookie_name: Option<String>,
    pub cookie_ttl_secs: Option<u64>,
}

/// Provides default values for `Settings`.
///
/// The defaults configure no backends; every backend has to be named in a
/// config file or the environment.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8443,
                log_level: "info".to_string(),
                max_chunk_bytes: 16 * 1024,
            },
            session: SessionSettings {
                cookie_name: "SSID".to_string(),
                cookie_ttl_secs: 3600,
            },
            backends: BTreeMap::new(),
        }
    }
}
