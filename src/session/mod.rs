//! Client sessions.
//!
//! A `Session` owns the broker connection of one client on one backend. The
//! connection is represented by a shared ready-future: the connect runs once,
//! and every subscription or publish issued before it completes simply awaits
//! the same result. A failed connect is handed to every waiter and is not
//! retried.
//!
//! The session counts the subscriptions and publishers it has spawned for
//! lifecycle tracking only; each of them is owned by the request serving it.
//!
//! Sessions are never closed explicitly. The connection lives until process
//! shutdown or until the broker drops it.

mod registry;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, error};

use crate::backend::{BackendAdapter, Connection};
use crate::utils::Result;

pub use registry::SessionRegistry;

/// One-shot, multi-waiter connect result.
pub type ReadyFuture = Shared<BoxFuture<'static, Result<Arc<dyn Connection>>>>;

pub struct Session {
    backend: String,
    id: String,
    ready: ReadyFuture,
    subscriptions: AtomicUsize,
    publishers: AtomicUsize,
}

impl Session {
    /// Creates the session and starts connecting in the background.
    pub fn new(backend: &str, id: &str, adapter: Arc<dyn BackendAdapter>) -> Self {
        let session_id = id.to_string();
        let backend_name = backend.to_string();
        let connect: BoxFuture<'static, Result<Arc<dyn Connection>>> = async move {
            debug!(backend = %backend_name, session = %session_id, "connecting session");
            let result = adapter.connect(&session_id).await;
            if let Err(e) = &result {
                error!(backend = %backend_name, session = %session_id, error = %e, "session connect failed");
            }
            result
        }
        .boxed();
        let ready = connect.shared();

        // Drive the connect even if nothing awaits it yet.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let eager = ready.clone();
            handle.spawn(async move {
                let _ = eager.await;
            });
        }

        Self {
            backend: backend.to_string(),
            id: id.to_string(),
            ready,
            subscriptions: AtomicUsize::new(0),
            publishers: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Waits for the connection; resolves immediately once connected.
    pub async fn ready(&self) -> Result<Arc<dyn Connection>> {
        self.ready.clone().await
    }

    pub fn ready_future(&self) -> ReadyFuture {
        self.ready.clone()
    }

    /// The connect outcome, if it has completed.
    pub fn peek(&self) -> Option<Result<Arc<dyn Connection>>> {
        self.ready.peek().cloned()
    }

    pub(crate) fn subscription_opened(&self) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn subscription_closed(&self) {
        release(&self.subscriptions);
    }

    pub(crate) fn publisher_opened(&self) {
        self.publishers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn publisher_closed(&self) {
        release(&self.publishers);
    }

    /// Number of subscriptions currently open on this session.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Number of publishers still waiting for their publish to finish.
    pub fn active_publishers(&self) -> usize {
        self.publishers.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend)
            .field("id", &self.id)
            .field("connected", &self.peek().map(|r| r.is_ok()))
            .field("subscriptions", &self.active_subscriptions())
            .field("publishers", &self.active_publishers())
            .finish()
    }
}

fn release(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
}
