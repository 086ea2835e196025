//! Pull-driven response bodies.
//!
//! [`PullBody`] adapts anything with the gateway's `poll` contract to an
//! `http_body::Body`. hyper polls the body whenever the connection can take
//! more bytes; `Wait` parks the task until the source's resume signal wakes
//! it. Dropping the body, which is what happens when the client goes away,
//! releases the source.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

use crate::publisher::Publisher;
use crate::subscription::{PollStatus, Subscription};

/// A source of response bytes pulled at the transport's pace.
pub trait PullSource: Send + Sync + 'static {
    fn pull(&self, max_bytes: usize) -> (Option<Bytes>, PollStatus);

    fn register_waker(&self, waker: &Waker);

    /// Called once the response body is gone.
    fn release(self: Arc<Self>) {}
}

impl PullSource for Subscription {
    fn pull(&self, max_bytes: usize) -> (Option<Bytes>, PollStatus) {
        self.poll(max_bytes)
    }

    fn register_waker(&self, waker: &Waker) {
        Subscription::register_waker(self, waker);
    }

    fn release(self: Arc<Self>) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { self.close().await });
        }
    }
}

impl PullSource for Publisher {
    fn pull(&self, max_bytes: usize) -> (Option<Bytes>, PollStatus) {
        self.poll(max_bytes)
    }

    fn register_waker(&self, waker: &Waker) {
        Publisher::register_waker(self, waker);
    }
}

pub struct PullBody<S: PullSource> {
    source: Arc<S>,
    max_bytes: usize,
    done: bool,
}

impl<S: PullSource> PullBody<S> {
    pub fn new(source: Arc<S>, max_bytes: usize) -> Self {
        Self {
            source,
            max_bytes,
            done: false,
        }
    }
}

impl<S: PullSource> Body for PullBody<S> {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        if self.done {
            return Poll::Ready(None);
        }
        // Register first so a resume between pull and return is not lost.
        self.source.register_waker(cx.waker());

        loop {
            match self.source.pull(self.max_bytes) {
                (_, PollStatus::Wait) => return Poll::Pending,
                (Some(data), PollStatus::More) if !data.is_empty() => {
                    return Poll::Ready(Some(Ok(Frame::data(data))));
                }
                (_, PollStatus::More) => continue,
                (data, PollStatus::End) => {
                    self.done = true;
                    return match data.filter(|d| !d.is_empty()) {
                        Some(data) => Poll::Ready(Some(Ok(Frame::data(data)))),
                        None => Poll::Ready(None),
                    };
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

impl<S: PullSource> Drop for PullBody<S> {
    fn drop(&mut self) {
        self.source.clone().release();
    }
}
