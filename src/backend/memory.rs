//! In-process broker backend.
//!
//! `MemoryBroker` manages topics and subscriber sinks in memory and fans a
//! published message out to every subscriber whose pattern matches the
//! routing key. It speaks the gateway's own pattern syntax, so no translation
//! is needed. Useful for development and as the deterministic backend in
//! tests.
//!
//! The broker's API is synchronous and lives behind a `Mutex`; sinks are
//! invoked after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use super::topic::{SubscriberId, Topic};
use super::{BackendAdapter, BackendKind, Connection, Message, MessageSink, SubscriptionHandle};
use crate::utils::{GatewayError, Result};

/// Topic table plus the sink registered by each subscriber.
#[derive(Default)]
pub struct MemoryBroker {
    topics: HashMap<String, Topic>,
    sinks: HashMap<SubscriberId, Arc<dyn MessageSink>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `subscriber` under `pattern`, creating the topic on first use.
    pub fn subscribe(&mut self, pattern: &str, subscriber: SubscriberId) {
        self.topics
            .entry(pattern.to_string())
            .or_insert_with(|| Topic::new(pattern))
            .subscribe(subscriber);
    }

    /// Removes the binding. Topics left without subscribers are dropped.
    pub fn unsubscribe(&mut self, pattern: &str, subscriber: &SubscriberId) {
        if let Some(topic) = self.topics.get_mut(pattern) {
            topic.unsubscribe(subscriber);
            if topic.subscribers.is_empty() {
                self.topics.remove(pattern);
            }
        }
    }

    pub fn register_sink(&mut self, subscriber: SubscriberId, sink: Arc<dyn MessageSink>) {
        self.sinks.insert(subscriber, sink);
    }

    pub fn remove_sink(&mut self, subscriber: &SubscriberId) -> bool {
        self.sinks.remove(subscriber).is_some()
    }

    /// Sinks of every consuming subscriber bound under a pattern matching `key`.
    ///
    /// Declared-but-not-consuming subscribers count as routable but receive
    /// nothing, like an AMQP queue nobody reads from yet.
    fn route(&self, key: &str) -> Option<Vec<Arc<dyn MessageSink>>> {
        let mut routed = false;
        let mut sinks = Vec::new();
        for topic in self.topics.values().filter(|t| t.matches(key)) {
            for id in &topic.subscribers {
                routed = true;
                if let Some(sink) = self.sinks.get(id) {
                    sinks.push(sink.clone());
                }
            }
        }
        routed.then_some(sinks)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

/// Adapter handing out connections to one shared [`MemoryBroker`].
pub struct MemoryAdapter {
    broker: Arc<Mutex<MemoryBroker>>,
    connects: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            broker: Arc::new(Mutex::new(MemoryBroker::new())),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn broker(&self) -> Arc<Mutex<MemoryBroker>> {
        self.broker.clone()
    }

    /// Number of connections opened so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(broker: &Mutex<MemoryBroker>) -> MutexGuard<'_, MemoryBroker> {
    broker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BackendAdapter for MemoryAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn connect(&self, session_id: &str) -> Result<Arc<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        // Connecting is a suspension point for every other backend too.
        tokio::task::yield_now().await;
        debug!(session = %session_id, "memory backend connected");
        Ok(Arc::new(MemoryConnection {
            broker: self.broker.clone(),
        }))
    }
}

pub struct MemoryConnection {
    broker: Arc<Mutex<MemoryBroker>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn declare_subscription(
        &self,
        pattern: &str,
        session_id: &str,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        let id = format!("{}.{}", session_id, Uuid::new_v4().simple());
        lock(&self.broker).subscribe(pattern, id.clone());
        debug!(subscriber = %id, pattern = %pattern, "memory subscription bound");
        Ok(Box::new(MemorySubscription {
            broker: self.broker.clone(),
            id,
            pattern: pattern.to_string(),
            stage: MemoryStage::Bound,
        }))
    }

    async fn publish(&self, routing_key: &str, payload: Bytes) -> Result<()> {
        let sinks = lock(&self.broker)
            .route(routing_key)
            .ok_or_else(|| GatewayError::UnknownRoutingTarget(routing_key.to_string()))?;
        for sink in sinks {
            sink.deliver(Message::new(routing_key, payload.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MemoryStage {
    Released,
    Bound,
    Consuming,
}

pub struct MemorySubscription {
    broker: Arc<Mutex<MemoryBroker>>,
    id: SubscriberId,
    pattern: String,
    stage: MemoryStage,
}

#[async_trait]
impl SubscriptionHandle for MemorySubscription {
    async fn consume(&mut self, sink: Arc<dyn MessageSink>) -> Result<()> {
        if self.stage == MemoryStage::Released {
            return Err(GatewayError::Subscribe(format!(
                "subscription {} already released",
                self.id
            )));
        }
        lock(&self.broker).register_sink(self.id.clone(), sink);
        self.stage = MemoryStage::Consuming;
        Ok(())
    }

    async fn teardown(&mut self) {
        let mut broker = lock(&self.broker);
        if self.stage >= MemoryStage::Bound {
            broker.unsubscribe(&self.pattern, &self.id);
        }
        if self.stage == MemoryStage::Consuming {
            broker.remove_sink(&self.id);
        }
        self.stage = MemoryStage::Released;
        debug!(subscriber = %self.id, "memory subscription released");
    }
}
