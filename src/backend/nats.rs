//! NATS backend on top of `async-nats`.
//!
//! One client per session, named after the session id. Each subscription is
//! a plain subject subscription pumped by its own task until teardown.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::topic::translate;
use super::{BackendAdapter, BackendKind, Connection, Message, MessageSink, SubscriptionHandle};
use crate::config::BackendConfig;
use crate::utils::{GatewayError, Result};

const DEFAULT_PORT: u16 = 4222;

/// Subjects are `.` separated; `*` is one token, `>` the rest.
pub const TRANSLATION: &[(char, char)] = &[('/', '.'), ('#', '>'), ('+', '*')];

pub struct NatsAdapter {
    config: BackendConfig,
}

impl NatsAdapter {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    pub fn server_url(&self) -> String {
        self.config.url.clone().unwrap_or_else(|| {
            format!(
                "nats://{}:{}",
                self.config.host,
                self.config.port_or(DEFAULT_PORT)
            )
        })
    }
}

#[async_trait]
impl BackendAdapter for NatsAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Nats
    }

    async fn connect(&self, session_id: &str) -> Result<Arc<dyn Connection>> {
        let options = match (&self.config.username, &self.config.password) {
            (Some(user), Some(password)) => {
                async_nats::ConnectOptions::with_user_and_password(user.clone(), password.clone())
            }
            _ => async_nats::ConnectOptions::new(),
        };
        let url = self.server_url();
        let client = options
            .name(session_id)
            .connect(url.as_str())
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        info!(url = %url, session = %session_id, "connected to nats server");
        Ok(Arc::new(NatsConnection { client }))
    }
}

pub struct NatsConnection {
    client: async_nats::Client,
}

#[async_trait]
impl Connection for NatsConnection {
    async fn declare_subscription(
        &self,
        pattern: &str,
        session_id: &str,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        let subject = translate(pattern, TRANSLATION);
        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| GatewayError::Subscribe(format!("{}: {}", subject, e)))?;
        debug!(session = %session_id, subject = %subject, "nats subject subscribed");
        Ok(Box::new(NatsSubscription {
            subject,
            stage: NatsStage::Subscribed(subscriber),
        }))
    }

    async fn publish(&self, routing_key: &str, payload: Bytes) -> Result<()> {
        let subject = translate(routing_key, TRANSLATION);
        self.client
            .publish(subject, payload)
            .await
            .map_err(|e| GatewayError::Publish(e.to_string()))?;
        self.client
            .flush()
            .await
            .map_err(|e| GatewayError::Publish(e.to_string()))
    }
}

enum NatsStage {
    Subscribed(async_nats::Subscriber),
    Consuming {
        stop: oneshot::Sender<()>,
        pump: JoinHandle<()>,
    },
    Released,
}

pub struct NatsSubscription {
    subject: String,
    stage: NatsStage,
}

async fn unsubscribe(subject: &str, mut subscriber: async_nats::Subscriber) {
    if let Err(e) = subscriber.unsubscribe().await {
        let error = GatewayError::Teardown(format!("unsubscribe {}: {}", subject, e));
        warn!(error = %error, "nats unsubscribe failed");
    }
}

#[async_trait]
impl SubscriptionHandle for NatsSubscription {
    async fn consume(&mut self, sink: Arc<dyn MessageSink>) -> Result<()> {
        let mut subscriber = match std::mem::replace(&mut self.stage, NatsStage::Released) {
            NatsStage::Subscribed(subscriber) => subscriber,
            other => {
                self.stage = other;
                return Err(GatewayError::Subscribe(format!(
                    "nats subscription {} is not ready for consuming",
                    self.subject
                )));
            }
        };

        let (stop, mut stopped) = oneshot::channel();
        let subject = self.subject.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stopped => {
                        unsubscribe(&subject, subscriber).await;
                        return;
                    }
                    next = subscriber.next() => match next {
                        Some(message) => {
                            sink.deliver(Message::new(message.subject.to_string(), message.payload));
                        }
                        None => {
                            sink.finish(Some(GatewayError::Subscribe(format!(
                                "nats subscription {} closed",
                                subject
                            ))));
                            return;
                        }
                    }
                }
            }
        });
        self.stage = NatsStage::Consuming { stop, pump };
        Ok(())
    }

    async fn teardown(&mut self) {
        match std::mem::replace(&mut self.stage, NatsStage::Released) {
            NatsStage::Subscribed(subscriber) => unsubscribe(&self.subject, subscriber).await,
            NatsStage::Consuming { stop, pump } => {
                // The pump may already be gone if the server closed the subscription.
                let _ = stop.send(());
                if let Err(e) = pump.await {
                    let error = GatewayError::Teardown(format!("pump {}: {}", self.subject, e));
                    warn!(error = %error, "nats pump task failed");
                }
            }
            NatsStage::Released => return,
        }
        debug!(subject = %self.subject, "nats subscription released");
    }
}
