use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use super::Session;
use crate::backend::BackendAdapter;

type SessionKey = (String, String);

/// Sessions keyed by `(backend name, session id)`.
///
/// Lookup and insert happen under one lock with no await in between, so two
/// racing first requests for the same key share one `Session` and therefore
/// one connect.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        backend: &str,
        session_id: &str,
        adapter: &Arc<dyn BackendAdapter>,
    ) -> Arc<Session> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .entry((backend.to_string(), session_id.to_string()))
            .or_insert_with(|| {
                info!(backend = %backend, session = %session_id, "new session");
                Arc::new(Session::new(backend, session_id, adapter.clone()))
            })
            .clone()
    }

    pub fn get(&self, backend: &str, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(backend.to_string(), session_id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
