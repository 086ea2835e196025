//! Delivery queue between broker callbacks and the HTTP pull loop.
//!
//! Broker tasks push messages; the transport pulls serialized bytes with
//! [`DeliveryQueue::poll`]. The only signal going the other way is the
//! [`ResumeSignal`], which wakes the transport after it was told to wait.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::task::Waker;

use bytes::Bytes;
use futures::task::AtomicWaker;

use crate::backend::Message;
use crate::encoding::Serializer;

/// Outcome of one pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Data returned; more may follow.
    More,
    /// Nothing to send yet; wait for a resume.
    Wait,
    /// The stream is over; no data will follow.
    End,
}

/// Observable state of a delivery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Empty,
    HasData,
    Ended,
}

/// Wakes the output driver so it pulls again.
#[derive(Default)]
pub struct ResumeSignal {
    waker: AtomicWaker,
    resumes: AtomicUsize,
}

impl ResumeSignal {
    pub fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.waker.wake();
    }

    pub fn register(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    /// Total resumes issued so far.
    pub fn count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

enum Queued {
    Delivery(Message),
    Notice(Bytes),
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<Queued>,
    /// Unsent tail of a chunk that did not fit the last pull window.
    carry: Option<Bytes>,
    ended: bool,
}

impl QueueState {
    fn drained(&self) -> bool {
        self.items.is_empty() && self.carry.is_none()
    }
}

#[derive(Default)]
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    resume: ResumeSignal,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn resume_signal(&self) -> &ResumeSignal {
        &self.resume
    }

    /// Appends a broker delivery. Returns `false` and drops the message if
    /// the stream already ended.
    pub fn push(&self, message: Message) -> bool {
        {
            let mut state = self.lock();
            if state.ended {
                return false;
            }
            state.items.push_back(Queued::Delivery(message));
        }
        self.resume.resume();
        true
    }

    /// Appends pre-encoded bytes, such as an error notice.
    pub fn push_notice(&self, notice: Bytes) -> bool {
        {
            let mut state = self.lock();
            if state.ended {
                return false;
            }
            state.items.push_back(Queued::Notice(notice));
        }
        self.resume.resume();
        true
    }

    /// Flags end-of-stream. Queued data is still handed out.
    pub fn end(&self) {
        self.lock().ended = true;
        self.resume.resume();
    }

    /// Drops everything still queued without acknowledging it.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        state.carry = None;
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> StreamState {
        let state = self.lock();
        if !state.drained() {
            StreamState::HasData
        } else if state.ended {
            StreamState::Ended
        } else {
            StreamState::Empty
        }
    }

    /// Pulls at most `max_bytes` of output.
    ///
    /// The oldest message is popped, acknowledged and serialized; bytes past
    /// the window are kept and returned first on the next pull. When messages
    /// remain after the pop the resume signal fires again so the backlog
    /// drains without waiting for another delivery.
    pub fn poll(&self, serializer: Serializer, max_bytes: usize) -> (Option<Bytes>, PollStatus) {
        let max_bytes = max_bytes.max(1);
        let mut state = self.lock();

        let mut chunk = match state.carry.take() {
            Some(carry) => carry,
            None => match state.items.pop_front() {
                Some(item) => {
                    if !state.items.is_empty() {
                        self.resume.resume();
                    }
                    match item {
                        Queued::Delivery(mut message) => {
                            message.ack();
                            serializer.serialize(&message)
                        }
                        Queued::Notice(notice) => notice,
                    }
                }
                None if state.ended => return (Some(Bytes::new()), PollStatus::End),
                None => return (None, PollStatus::Wait),
            },
        };

        if chunk.len() > max_bytes {
            state.carry = Some(chunk.split_off(max_bytes));
        }
        let status = if state.ended && state.drained() {
            PollStatus::End
        } else {
            PollStatus::More
        };
        (Some(chunk), status)
    }
}
