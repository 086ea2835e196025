//! Broker backend adapters.
//!
//! Every broker technology is reached through the same three traits:
//!
//! - [`BackendAdapter`]: builds one [`Connection`] per client session.
//! - [`Connection`]: declares subscriptions and publishes messages.
//! - [`SubscriptionHandle`]: starts consumption and releases broker-side
//!   resources on teardown.
//!
//! Adapters translate the gateway's path-style topic patterns (`/` separated,
//! `#` as trailing wildcard) into their broker's native syntax. The adapter
//! for a backend is picked once at startup by [`create_adapter`] from the
//! `kind` tag of its [`BackendConfig`].

pub mod amqp;
pub mod memory;
pub mod message;
pub mod mqtt;
pub mod nats;
pub mod redis;
pub mod topic;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::config::BackendConfig;
use crate::utils::{GatewayError, Result};

pub use message::{Acknowledge, Message};

/// Broker technology tag, as written in the `kind` key of a backend section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Amqp,
    Mqtt,
    Nats,
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::Amqp => "amqp",
            BackendKind::Mqtt => "mqtt",
            BackendKind::Nats => "nats",
            BackendKind::Redis => "redis",
        };
        f.write_str(name)
    }
}

/// Receiver of broker deliveries for one subscription.
///
/// `deliver` is called once per message in broker order. `finish` is called
/// at most once when the broker side stops delivering, with the cause if it
/// stopped because of an error.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, message: Message);
    fn finish(&self, error: Option<GatewayError>);
}

/// Factory for per-session broker connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Opens the broker connection for one client session.
    async fn connect(&self, session_id: &str) -> Result<Arc<dyn Connection>>;
}

/// A live broker connection shared by every resource of one session.
///
/// Implementations must accept concurrent calls; if the underlying client
/// cannot, the implementation queues them internally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    /// Creates whatever the broker needs to route messages matching `pattern`
    /// to this session. A failure leaves nothing behind on the broker.
    async fn declare_subscription(
        &self,
        pattern: &str,
        session_id: &str,
    ) -> Result<Box<dyn SubscriptionHandle>>;

    /// Sends one message. Errors distinguish an unroutable key from a broker
    /// rejection.
    async fn publish(&self, routing_key: &str, payload: Bytes) -> Result<()>;
}

/// Broker-side state of one subscription.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionHandle: Send {
    /// Starts delivering to `sink` for the rest of the handle's life.
    async fn consume(&mut self, sink: Arc<dyn MessageSink>) -> Result<()>;

    /// Releases broker resources: unbind, cancel the consumer, delete the
    /// queue. Each step is best-effort and only attempted if it was reached.
    /// Safe to call more than once.
    async fn teardown(&mut self);
}

/// Builds the adapter for a configured backend.
pub fn create_adapter(config: &BackendConfig) -> Arc<dyn BackendAdapter> {
    match config.kind {
        BackendKind::Memory => Arc::new(memory::MemoryAdapter::new()),
        BackendKind::Amqp => Arc::new(amqp::AmqpAdapter::new(config.clone())),
        BackendKind::Mqtt => Arc::new(mqtt::MqttAdapter::new(config.clone())),
        BackendKind::Nats => Arc::new(nats::NatsAdapter::new(config.clone())),
        BackendKind::Redis => Arc::new(redis::RedisAdapter::new(config.clone())),
    }
}

#[cfg(test)]
mod tests;
