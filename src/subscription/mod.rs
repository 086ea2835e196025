//! Subscriptions: broker push on one side, HTTP pull on the other.
//!
//! Opening a subscription spawns its setup: wait for the session connection,
//! declare the broker-side subscription, start consuming. Broker deliveries
//! land in a [`DeliveryQueue`]; the transport drains it through
//! [`Subscription::poll`] at the pace the client reads.
//!
//! A failed setup does not affect the session or other subscriptions: the
//! stream gets one error notice and then ends. Closing the subscription (the
//! client went away) tears the broker side down, best-effort.

pub mod delivery;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::backend::{Message, MessageSink, SubscriptionHandle};
use crate::encoding::Serializer;
use crate::session::Session;
use crate::utils::GatewayError;

pub use delivery::{DeliveryQueue, PollStatus, ResumeSignal, StreamState};

/// Receiving half shared with the broker adapter.
struct Inbox {
    queue: DeliveryQueue,
    serializer: Serializer,
}

impl MessageSink for Inbox {
    fn deliver(&self, message: Message) {
        if !self.queue.push(message) {
            debug!("delivery after end of stream dropped");
        }
    }

    fn finish(&self, error: Option<GatewayError>) {
        if let Some(error) = error {
            warn!(error = %error, "subscription ended by failure");
            self.queue
                .push_notice(self.serializer.error_notice(&error.to_string()));
        }
        self.queue.end();
    }
}

enum Stage {
    /// Waiting for the connection or for the broker-side declare.
    Pending,
    Active(Box<dyn SubscriptionHandle>),
    Released,
}

pub struct Subscription {
    inbox: Arc<Inbox>,
    stage: Arc<Mutex<Stage>>,
    cancel: Arc<Notify>,
    closed: AtomicBool,
    session: Arc<Session>,
    pattern: String,
}

impl Subscription {
    /// Opens a subscription on `pattern` and starts its setup in the background.
    pub fn open(session: Arc<Session>, pattern: &str, serializer: Serializer) -> Self {
        let subscription = Self {
            inbox: Arc::new(Inbox {
                queue: DeliveryQueue::new(),
                serializer,
            }),
            stage: Arc::new(Mutex::new(Stage::Pending)),
            cancel: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            session: session.clone(),
            pattern: pattern.to_string(),
        };
        session.subscription_opened();

        tokio::spawn(setup(
            session,
            subscription.pattern.clone(),
            subscription.inbox.clone(),
            subscription.stage.clone(),
            subscription.cancel.clone(),
        ));
        subscription
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn serializer(&self) -> Serializer {
        self.inbox.serializer
    }

    pub fn content_type(&self) -> &'static str {
        self.inbox.serializer.content_type()
    }

    pub fn state(&self) -> StreamState {
        self.inbox.queue.state()
    }

    pub fn resume_signal(&self) -> &ResumeSignal {
        self.inbox.queue.resume_signal()
    }

    /// Registers the task to wake when `poll` should be called again.
    pub fn register_waker(&self, waker: &Waker) {
        self.inbox.queue.resume_signal().register(waker);
    }

    pub fn poll(&self, max_bytes: usize) -> (Option<Bytes>, PollStatus) {
        self.inbox.queue.poll(self.inbox.serializer, max_bytes)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ends the stream and releases the broker side. Only the first call
    /// does anything. Messages still queued are dropped unacknowledged.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.notify_one();
        self.inbox.queue.end();
        let dropped = self.inbox.queue.clear();

        let stage = std::mem::replace(&mut *self.stage.lock().await, Stage::Released);
        if let Stage::Active(mut handle) = stage {
            handle.teardown().await;
        }
        self.session.subscription_closed();
        info!(
            session = %self.session.id(),
            pattern = %self.pattern,
            dropped,
            "subscription closed"
        );
    }
}

async fn setup(
    session: Arc<Session>,
    pattern: String,
    inbox: Arc<Inbox>,
    stage: Arc<Mutex<Stage>>,
    cancel: Arc<Notify>,
) {
    let connection = tokio::select! {
        result = session.ready() => result,
        _ = cancel.notified() => return,
    };
    let connection = match connection {
        Ok(connection) => connection,
        Err(e) => {
            inbox.finish(Some(e));
            return;
        }
    };

    let mut stage = stage.lock().await;
    if !matches!(*stage, Stage::Pending) {
        return;
    }

    let mut handle = match connection.declare_subscription(&pattern, session.id()).await {
        Ok(handle) => handle,
        Err(e) => {
            *stage = Stage::Released;
            inbox.finish(Some(e));
            return;
        }
    };
    if let Err(e) = handle.consume(inbox.clone()).await {
        handle.teardown().await;
        *stage = Stage::Released;
        inbox.finish(Some(e));
        return;
    }

    debug!(session = %session.id(), pattern = %pattern, "subscription consuming");
    *stage = Stage::Active(handle);
}
