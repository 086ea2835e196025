use bytes::{BufMut, Bytes, BytesMut};

use crate::backend::Message;

/// Wire encoding of a subscription stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serializer {
    /// `text/event-stream`: one `data:` line per payload line, blank line after.
    EventStream,
    /// `text/plain`: raw payload followed by a newline.
    Plain,
}

impl Serializer {
    /// Every available encoding, in server preference order.
    pub const ALL: [Serializer; 2] = [Serializer::EventStream, Serializer::Plain];

    pub fn content_type(&self) -> &'static str {
        match self {
            Serializer::EventStream => "text/event-stream",
            Serializer::Plain => "text/plain",
        }
    }

    pub fn serialize(&self, message: &Message) -> Bytes {
        self.encode(&message.payload)
    }

    /// Encodes a raw payload.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        match self {
            Serializer::EventStream => {
                let lines = payload.split(|b| *b == b'\n');
                let mut out = BytesMut::with_capacity(payload.len() + 16);
                for line in lines {
                    out.put_slice(b"data: ");
                    out.put_slice(line);
                    out.put_u8(b'\n');
                }
                out.put_u8(b'\n');
                out.freeze()
            }
            Serializer::Plain => {
                let mut out = BytesMut::with_capacity(payload.len() + 1);
                out.put_slice(payload);
                out.put_u8(b'\n');
                out.freeze()
            }
        }
    }

    /// Frame telling the client the stream ended because of `reason`.
    pub fn error_notice(&self, reason: &str) -> Bytes {
        // Keep the notice on one line whatever the error text contains.
        let reason = reason.replace(['\r', '\n'], " ");
        match self {
            Serializer::EventStream => Bytes::from(format!("event: error\ndata: {}\n\n", reason)),
            Serializer::Plain => Bytes::from(format!("error: {}\n", reason)),
        }
    }
}
