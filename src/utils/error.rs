//! Error types used across the gateway.
//!
//! Every failure is local to the resource that hit it: a `Connect` error
//! poisons one Session's ready-future, a `Subscribe` error ends one
//! Subscription, a `Publish` error turns one POST into a `500`. Nothing here
//! is ever allowed to take the process down.

use thiserror::Error;

/// Failure kinds surfaced by the gateway core.
///
/// The type is `Clone` because one connect failure is delivered to every
/// operation waiting on the same Session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The broker was unreachable or rejected the credentials.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Declaring, binding or consuming for a subscription failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The broker refused an outbound message.
    #[error("publish failed: {0}")]
    Publish(String),

    /// No routing key could be resolved, or the broker could not route it.
    #[error("unknown routing target: {0}")]
    UnknownRoutingTarget(String),

    /// Releasing a broker-side resource failed. Logged, never propagated.
    #[error("teardown failed: {0}")]
    Teardown(String),

    /// The request named a backend that is not configured.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// The HTTP request could not be read.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Short machine-readable name used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Connect(_) => "connect",
            GatewayError::Subscribe(_) => "subscribe",
            GatewayError::Publish(_) => "publish",
            GatewayError::UnknownRoutingTarget(_) => "unknown_routing_target",
            GatewayError::Teardown(_) => "teardown",
            GatewayError::UnknownBackend(_) => "unknown_backend",
            GatewayError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
