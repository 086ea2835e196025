//! Broker message envelope.
//!
//! A `Message` carries the routing key it arrived on, the raw payload and an
//! optional acknowledgement handle. Brokers without explicit acks (MQTT QoS 0,
//! core NATS, Redis pub/sub) deliver messages without a handle.

use std::fmt;

use bytes::Bytes;

/// One-shot acknowledgement of a delivered message.
pub trait Acknowledge: Send {
    fn ack(self: Box<Self>);
}

pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    ack: Option<Box<dyn Acknowledge>>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            ack: None,
        }
    }

    pub fn with_ack(mut self, ack: Box<dyn Acknowledge>) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Acknowledges the message. Returns `false` if there was nothing left to
    /// acknowledge, so a message is never acked twice.
    pub fn ack(&mut self) -> bool {
        match self.ack.take() {
            Some(ack) => {
                ack.ack();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .field("pending_ack", &self.ack.is_some())
            .finish()
    }
}
