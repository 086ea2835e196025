//! Request entry points.
//!
//! A `Controller` serves one configured backend: `get` opens a subscription
//! stream, `post` creates a publisher. The `Gateway` owns one controller per
//! backend plus the session registry they share, and is built once at
//! startup from the settings.

mod response;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::topic::MATCH_ALL;
use crate::backend::{BackendAdapter, create_adapter};
use crate::config::{BackendConfig, Settings};
use crate::encoding::negotiate;
use crate::publisher::Publisher;
use crate::session::{Session, SessionRegistry};
use crate::subscription::Subscription;
use crate::utils::{GatewayError, Result};

pub use response::ResponseHead;

/// Path capture holding the topic pattern.
pub const PATTERN_PARAM: &str = "pattern";
/// Query parameter holding the routing key of a publish.
pub const ROUTING_KEY_PARAM: &str = "k";

/// What the core needs to know about an HTTP request.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub session_id: String,
    pub path_params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub accept: Option<String>,
}

impl GatewayRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_path_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }
}

pub struct Controller {
    name: String,
    config: BackendConfig,
    adapter: Arc<dyn BackendAdapter>,
    sessions: Arc<SessionRegistry>,
}

impl Controller {
    pub fn new(
        name: &str,
        config: BackendConfig,
        adapter: Arc<dyn BackendAdapter>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            name: name.to_string(),
            config,
            adapter,
            sessions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn session(&self, request: &GatewayRequest) -> Arc<Session> {
        self.sessions
            .get_or_create(&self.name, &request.session_id, &self.adapter)
    }

    /// Configured fixed pattern, else the path capture, else everything.
    pub fn pattern(&self, request: &GatewayRequest) -> String {
        self.config
            .subscription
            .clone()
            .or_else(|| {
                request
                    .path_params
                    .get(PATTERN_PARAM)
                    .filter(|p| !p.is_empty())
                    .cloned()
            })
            .unwrap_or_else(|| MATCH_ALL.to_string())
    }

    /// The `k` query parameter, else the configured default.
    pub fn routing_key(&self, request: &GatewayRequest) -> Option<String> {
        request
            .query
            .get(ROUTING_KEY_PARAM)
            .filter(|k| !k.is_empty())
            .cloned()
            .or_else(|| self.config.publish_topic.clone())
    }

    /// Starts a `200` stream in the negotiated encoding.
    pub fn get(&self, request: &GatewayRequest) -> (ResponseHead, Subscription) {
        let serializer = negotiate(request.accept.as_deref());
        let pattern = self.pattern(request);
        debug!(
            backend = %self.name,
            session = %request.session_id,
            pattern = %pattern,
            content_type = serializer.content_type(),
            "subscribe"
        );
        let head = ResponseHead::new(200, serializer.content_type());
        let subscription = Subscription::open(self.session(request), &pattern, serializer);
        (head, subscription)
    }

    /// The response head is produced by the publisher once the body is in.
    pub fn post(&self, request: &GatewayRequest) -> Publisher {
        Publisher::new(self.session(request), self.routing_key(request))
    }
}

/// Every configured backend, by name.
#[derive(Default)]
pub struct Gateway {
    controllers: BTreeMap<String, Controller>,
    sessions: Arc<SessionRegistry>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut gateway = Self::new();
        for (name, config) in &settings.backends {
            gateway.add_backend(name, config.clone(), create_adapter(config));
        }
        gateway
    }

    pub fn add_backend(
        &mut self,
        name: &str,
        config: BackendConfig,
        adapter: Arc<dyn BackendAdapter>,
    ) {
        info!(backend = %name, kind = %config.kind, "backend registered");
        let controller = Controller::new(name, config, adapter, self.sessions.clone());
        self.controllers.insert(name.to_string(), controller);
    }

    pub fn controller(&self, name: &str) -> Result<&Controller> {
        self.controllers
            .get(name)
            .ok_or_else(|| GatewayError::UnknownBackend(name.to_string()))
    }

    pub fn backends(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}
