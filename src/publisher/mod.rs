//! POST handling: buffer the request body, publish it once, answer once.
//!
//! The body is accumulated in memory as it arrives. When it is complete the
//! publisher waits for the session connection, publishes to the resolved
//! routing key and fixes the response: `200` with `{}` on success, `500` with
//! a JSON body naming the failure otherwise. The response body is handed out
//! by [`Publisher::poll`] exactly once, followed by end-of-stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::task::Waker;

use bytes::{Bytes, BytesMut};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::controller::ResponseHead;
use crate::session::Session;
use crate::subscription::{PollStatus, ResumeSignal};
use crate::utils::{GatewayError, Result};

const CONTENT_TYPE: &str = "application/json";

struct Response {
    head: ResponseHead,
    body: Bytes,
}

impl Response {
    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                head: ResponseHead::new(200, CONTENT_TYPE),
                body: Bytes::from_static(b"{}"),
            },
            Err(e) => {
                let body = json!({ "error": e.kind(), "message": e.to_string() });
                Self {
                    head: ResponseHead::new(500, CONTENT_TYPE),
                    body: Bytes::from(body.to_string()),
                }
            }
        }
    }
}

pub struct Publisher {
    session: Arc<Session>,
    routing_key: Option<String>,
    body: StdMutex<BytesMut>,
    response: Mutex<Option<Response>>,
    sent: AtomicBool,
    /// Cleared once the session stops counting this publisher.
    tracked: AtomicBool,
    resume: ResumeSignal,
}

impl Publisher {
    /// `routing_key` is `None` when neither the request nor the backend
    /// configuration names one; completing such a publisher yields a `500`.
    pub fn new(session: Arc<Session>, routing_key: Option<String>) -> Self {
        session.publisher_opened();
        Self {
            session,
            routing_key,
            body: StdMutex::new(BytesMut::new()),
            response: Mutex::new(None),
            sent: AtomicBool::new(false),
            tracked: AtomicBool::new(true),
            resume: ResumeSignal::default(),
        }
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }

    pub fn on_body_chunk(&self, chunk: &[u8]) {
        self.body
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(chunk);
    }

    /// Publishes the buffered body and fixes the response. Later calls
    /// return the same head without publishing again.
    pub async fn on_body_complete(&self) -> ResponseHead {
        let mut response = self.response.lock().await;
        if let Some(existing) = response.as_ref() {
            return existing.head.clone();
        }

        let payload = self
            .body
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .split()
            .freeze();
        let result = self.publish(payload).await;
        if let Err(e) = &result {
            warn!(session = %self.session.id(), error = %e, "publish failed");
        }

        let outcome = Response::from_result(result);
        let head = outcome.head.clone();
        *response = Some(outcome);
        drop(response);
        self.untrack();
        self.resume.resume();
        head
    }

    fn untrack(&self) {
        if self.tracked.swap(false, Ordering::SeqCst) {
            self.session.publisher_closed();
        }
    }

    async fn publish(&self, payload: Bytes) -> Result<()> {
        let routing_key = self.routing_key.as_deref().ok_or_else(|| {
            GatewayError::UnknownRoutingTarget("no routing key for request".to_string())
        })?;
        let connection = self.session.ready().await?;
        connection.publish(routing_key, payload).await?;
        debug!(session = %self.session.id(), key = %routing_key, "message published");
        Ok(())
    }

    pub fn register_waker(&self, waker: &Waker) {
        self.resume.register(waker);
    }

    pub fn poll(&self, _max_bytes: usize) -> (Option<Bytes>, PollStatus) {
        let Ok(response) = self.response.try_lock() else {
            return (None, PollStatus::Wait);
        };
        match response.as_ref() {
            None => (None, PollStatus::Wait),
            Some(_) if self.sent.swap(true, Ordering::SeqCst) => {
                (Some(Bytes::new()), PollStatus::End)
            }
            Some(r) => (Some(r.body.clone()), PollStatus::End),
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.untrack();
    }
}
