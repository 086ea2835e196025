//! MQTT backend on top of the `paho-mqtt` async client.
//!
//! The session id doubles as the MQTT client id and the session is opened
//! with `clean_session = false`, so the broker keeps subscriptions across
//! reconnects. The client has a single message stream; a dispatcher task
//! routes each message to every subscription whose filter matches its topic.
//! Filters are reference counted so two subscriptions on the same filter
//! share one broker-side subscribe. A subscription joining a filter whose
//! subscribe is still in flight waits for that same result, so a failed
//! subscribe fails every route that joined it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, Shared};
use futures::{FutureExt, StreamExt};
use paho_mqtt::{AsyncClient, ConnectOptionsBuilder, CreateOptionsBuilder};
use tracing::{debug, info, warn};

use super::topic::{matches, translate};
use super::{BackendAdapter, BackendKind, Connection, Message, MessageSink, SubscriptionHandle};
use crate::config::BackendConfig;
use crate::utils::{GatewayError, Result};

const DEFAULT_PORT: u16 = 1883;
const QOS: i32 = 0;
const STREAM_BUFFER: usize = 64;

/// MQTT filters already use the path syntax.
pub const TRANSLATION: &[(char, char)] = &[];

pub struct MqttAdapter {
    config: BackendConfig,
}

impl MqttAdapter {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    pub fn server_uri(&self) -> String {
        self.config.url.clone().unwrap_or_else(|| {
            format!(
                "tcp://{}:{}",
                self.config.host,
                self.config.port_or(DEFAULT_PORT)
            )
        })
    }
}

#[async_trait]
impl BackendAdapter for MqttAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Mqtt
    }

    async fn connect(&self, session_id: &str) -> Result<Arc<dyn Connection>> {
        let create_opts = CreateOptionsBuilder::new()
            .server_uri(self.server_uri())
            .client_id(session_id)
            .finalize();
        let mut client =
            AsyncClient::new(create_opts).map_err(|e| GatewayError::Connect(e.to_string()))?;

        let conn_opts = {
            let mut conn_opts = ConnectOptionsBuilder::new();
            conn_opts
                .keep_alive_interval(Duration::from_secs(self.config.keepalive_secs))
                .clean_session(false)
                .automatic_reconnect(Duration::from_secs(1), Duration::from_secs(30));
            if let Some(username) = &self.config.username {
                conn_opts.user_name(username.as_str());
            }
            if let Some(password) = &self.config.password {
                conn_opts.password(password.as_str());
            }
            conn_opts.finalize()
        };

        // The stream has to exist before connecting or early messages are lost.
        let mut stream = client.get_stream(STREAM_BUFFER);
        client
            .connect(conn_opts)
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        info!(uri = %self.server_uri(), session = %session_id, "connected to mqtt broker");

        let routes = Arc::new(Mutex::new(Routes::default()));
        let dispatch_routes = routes.clone();
        let session = session_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                match event {
                    Some(message) => {
                        let sinks = lock(&dispatch_routes).sinks_for(message.topic());
                        for sink in sinks {
                            sink.deliver(Message::new(
                                message.topic(),
                                Bytes::copy_from_slice(message.payload()),
                            ));
                        }
                    }
                    None => warn!(session = %session, "mqtt connection lost, reconnecting"),
                }
            }
            debug!(session = %session, "mqtt dispatcher finished");
            let sinks = lock(&dispatch_routes).detach_all();
            for sink in sinks {
                sink.finish(Some(GatewayError::Subscribe(
                    "mqtt client stopped".to_string(),
                )));
            }
        });

        Ok(Arc::new(MqttConnection { client, routes }))
    }
}

struct Route {
    filter: String,
    sink: Option<Arc<dyn MessageSink>>,
}

/// Outcome of the broker-side subscribe of one filter, shared by every route
/// on that filter.
pub(crate) type FilterReady = Shared<BoxFuture<'static, Result<()>>>;

struct Filter {
    routes: usize,
    ready: FilterReady,
}

/// Subscriptions of one client, keyed by route id.
#[derive(Default)]
pub(crate) struct Routes {
    next_id: u64,
    entries: HashMap<u64, Route>,
    filters: HashMap<String, Filter>,
}

impl Routes {
    /// Registers a route and returns its id with the filter's subscribe
    /// outcome. `subscribe` runs only when the filter is new or its last
    /// subscribe failed; otherwise the route joins the existing one.
    pub(crate) fn add<F>(&mut self, filter: &str, subscribe: F) -> (u64, FilterReady)
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>>,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            Route {
                filter: filter.to_string(),
                sink: None,
            },
        );

        match self.filters.get_mut(filter) {
            Some(existing) => {
                if matches!(existing.ready.peek(), Some(Err(_))) {
                    existing.ready = subscribe().shared();
                }
                existing.routes += 1;
                (id, existing.ready.clone())
            }
            None => {
                let ready = subscribe().shared();
                self.filters.insert(
                    filter.to_string(),
                    Filter {
                        routes: 1,
                        ready: ready.clone(),
                    },
                );
                (id, ready)
            }
        }
    }

    /// Drops a route; returns `true` if it was the last one on its filter.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let Some(route) = self.entries.remove(&id) else {
            return false;
        };
        match self.filters.get_mut(&route.filter) {
            Some(filter) if filter.routes > 1 => {
                filter.routes -= 1;
                false
            }
            Some(_) => {
                self.filters.remove(&route.filter);
                true
            }
            None => false,
        }
    }

    pub(crate) fn attach(&mut self, id: u64, sink: Arc<dyn MessageSink>) -> bool {
        match self.entries.get_mut(&id) {
            Some(route) => {
                route.sink = Some(sink);
                true
            }
            None => false,
        }
    }

    pub(crate) fn sinks_for(&self, topic: &str) -> Vec<Arc<dyn MessageSink>> {
        self.entries
            .values()
            .filter(|route| matches(&route.filter, topic))
            .filter_map(|route| route.sink.clone())
            .collect()
    }

    /// Detaches every sink, leaving the routes in place for teardown.
    pub(crate) fn detach_all(&mut self) -> Vec<Arc<dyn MessageSink>> {
        self.entries
            .values_mut()
            .filter_map(|route| route.sink.take())
            .collect()
    }
}

fn lock(routes: &Mutex<Routes>) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MqttConnection {
    client: AsyncClient,
    routes: Arc<Mutex<Routes>>,
}

#[async_trait]
impl Connection for MqttConnection {
    async fn declare_subscription(
        &self,
        pattern: &str,
        session_id: &str,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        let filter = translate(pattern, TRANSLATION);
        let client = self.client.clone();
        let subscribe_filter = filter.clone();
        let (id, ready) = lock(&self.routes).add(&filter, move || {
            async move {
                client
                    .subscribe(subscribe_filter.as_str(), QOS)
                    .await
                    .map(|_| ())
                    .map_err(|e| GatewayError::Subscribe(format!("{}: {}", subscribe_filter, e)))
            }
            .boxed()
        });

        if let Err(e) = ready.await {
            lock(&self.routes).remove(id);
            return Err(e);
        }
        debug!(session = %session_id, filter = %filter, "mqtt filter subscribed");

        Ok(Box::new(MqttSubscription {
            client: self.client.clone(),
            routes: self.routes.clone(),
            id,
            filter,
            released: false,
        }))
    }

    async fn publish(&self, routing_key: &str, payload: Bytes) -> Result<()> {
        let topic = translate(routing_key, TRANSLATION);
        let message = paho_mqtt::Message::new(topic, payload.to_vec(), QOS);
        self.client
            .publish(message)
            .await
            .map_err(|e| GatewayError::Publish(e.to_string()))
    }
}

pub struct MqttSubscription {
    client: AsyncClient,
    routes: Arc<Mutex<Routes>>,
    id: u64,
    filter: String,
    released: bool,
}

#[async_trait]
impl SubscriptionHandle for MqttSubscription {
    async fn consume(&mut self, sink: Arc<dyn MessageSink>) -> Result<()> {
        if self.released || !lock(&self.routes).attach(self.id, sink) {
            return Err(GatewayError::Subscribe(format!(
                "mqtt route for {} already released",
                self.filter
            )));
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let last = lock(&self.routes).remove(self.id);
        if last {
            if let Err(e) = self.client.unsubscribe(self.filter.as_str()).await {
                let error =
                    GatewayError::Teardown(format!("unsubscribe {}: {}", self.filter, e));
                warn!(error = %error, "mqtt unsubscribe failed");
            }
        }
        debug!(filter = %self.filter, "mqtt subscription released");
    }
}

#[cfg(test)]
impl Routes {
    pub(crate) fn filter_count(&self) -> usize {
        self.filters.len()
    }
}
