//! Redis pub/sub backend on top of `redis`.
//!
//! Publishing shares one multiplexed connection per session. A subscription
//! needs a connection of its own in subscriber mode, so each one opens a
//! dedicated pub/sub connection. Patterns containing `*` after translation
//! use `PSUBSCRIBE`, plain channel names use `SUBSCRIBE`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::{MultiplexedConnection, PubSub};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::topic::translate;
use super::{BackendAdapter, BackendKind, Connection, Message, MessageSink, SubscriptionHandle};
use crate::config::BackendConfig;
use crate::utils::{GatewayError, Result};

const DEFAULT_PORT: u16 = 6379;

/// Channel names use `:` as separator; `*` is the glob wildcard.
pub const TRANSLATION: &[(char, char)] = &[('/', ':'), ('#', '*')];

pub struct RedisAdapter {
    config: BackendConfig,
}

impl RedisAdapter {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    pub fn url(&self) -> String {
        self.config.url.clone().unwrap_or_else(|| {
            let auth = match (&self.config.username, &self.config.password) {
                (Some(user), Some(password)) => format!("{}:{}@", user, password),
                (None, Some(password)) => format!(":{}@", password),
                _ => String::new(),
            };
            format!(
                "redis://{}{}:{}",
                auth,
                self.config.host,
                self.config.port_or(DEFAULT_PORT)
            )
        })
    }
}

#[async_trait]
impl BackendAdapter for RedisAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn connect(&self, session_id: &str) -> Result<Arc<dyn Connection>> {
        let client =
            redis::Client::open(self.url()).map_err(|e| GatewayError::Connect(e.to_string()))?;
        let publisher = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        info!(host = %self.config.host, session = %session_id, "connected to redis");
        Ok(Arc::new(RedisConnection { client, publisher }))
    }
}

pub struct RedisConnection {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

/// Whether a translated channel name needs pattern subscription.
pub fn is_pattern(channel: &str) -> bool {
    channel.contains('*')
}

#[async_trait]
impl Connection for RedisConnection {
    async fn declare_subscription(
        &self,
        pattern: &str,
        session_id: &str,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        let channel = translate(pattern, TRANSLATION);
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| GatewayError::Subscribe(e.to_string()))?;

        let subscribed = if is_pattern(&channel) {
            pubsub.psubscribe(&channel).await
        } else {
            pubsub.subscribe(&channel).await
        };
        subscribed.map_err(|e| GatewayError::Subscribe(format!("{}: {}", channel, e)))?;
        debug!(session = %session_id, channel = %channel, "redis channel subscribed");

        Ok(Box::new(RedisSubscription {
            channel,
            stage: RedisStage::Subscribed(pubsub),
        }))
    }

    async fn publish(&self, routing_key: &str, payload: Bytes) -> Result<()> {
        let channel = translate(routing_key, TRANSLATION);
        let mut publisher = self.publisher.clone();
        let receivers: i64 = publisher
            .publish(&channel, payload.as_ref())
            .await
            .map_err(|e| GatewayError::Publish(e.to_string()))?;
        debug!(channel = %channel, receivers, "redis message published");
        Ok(())
    }
}

enum RedisStage {
    Subscribed(PubSub),
    Consuming {
        stop: oneshot::Sender<()>,
        pump: JoinHandle<()>,
    },
    Released,
}

pub struct RedisSubscription {
    channel: String,
    stage: RedisStage,
}

async fn unsubscribe(channel: &str, mut pubsub: PubSub) {
    let result = if is_pattern(channel) {
        pubsub.punsubscribe(channel).await
    } else {
        pubsub.unsubscribe(channel).await
    };
    if let Err(e) = result {
        let error = GatewayError::Teardown(format!("unsubscribe {}: {}", channel, e));
        warn!(error = %error, "redis unsubscribe failed");
    }
}

#[async_trait]
impl SubscriptionHandle for RedisSubscription {
    async fn consume(&mut self, sink: Arc<dyn MessageSink>) -> Result<()> {
        let mut pubsub = match std::mem::replace(&mut self.stage, RedisStage::Released) {
            RedisStage::Subscribed(pubsub) => pubsub,
            other => {
                self.stage = other;
                return Err(GatewayError::Subscribe(format!(
                    "redis subscription {} is not ready for consuming",
                    self.channel
                )));
            }
        };

        let (stop, mut stopped) = oneshot::channel::<()>();
        let channel = self.channel.clone();
        let pump = tokio::spawn(async move {
            let closed = {
                let messages = pubsub.on_message();
                tokio::pin!(messages);
                loop {
                    tokio::select! {
                        _ = &mut stopped => break false,
                        next = messages.next() => match next {
                            Some(msg) => {
                                let topic = msg.get_channel_name().to_string();
                                let payload = Bytes::copy_from_slice(msg.get_payload_bytes());
                                sink.deliver(Message::new(topic, payload));
                            }
                            None => break true,
                        }
                    }
                }
            };
            if closed {
                sink.finish(Some(GatewayError::Subscribe(format!(
                    "redis subscription {} closed",
                    channel
                ))));
            } else {
                unsubscribe(&channel, pubsub).await;
            }
        });
        self.stage = RedisStage::Consuming { stop, pump };
        Ok(())
    }

    async fn teardown(&mut self) {
        match std::mem::replace(&mut self.stage, RedisStage::Released) {
            RedisStage::Subscribed(pubsub) => unsubscribe(&self.channel, pubsub).await,
            RedisStage::Consuming { stop, pump } => {
                let _ = stop.send(());
                if let Err(e) = pump.await {
                    let error = GatewayError::Teardown(format!("pump {}: {}", self.channel, e));
                    warn!(error = %error, "redis pump task failed");
                }
            }
            RedisStage::Released => return,
        }
        debug!(channel = %self.channel, "redis subscription released");
    }
}
