//! Wire framing for tagged binary messages
//!
//! Every message travels as an 8-byte header followed by its payload:
//! a little-endian `u32` tag, a little-endian `u32` payload length, then
//! exactly that many payload bytes. The payload is opaque to the transport.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::constants::{DEFAULT_MAX_PACKET_SIZE, HEADER_LEN};
use crate::error::{RealmError, Result};

/// A framed message: application tag plus opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub tag: u32,
    pub payload: Bytes,
}

impl Message {
    pub fn new(tag: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Length of the payload section on the wire
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Length-prefixed codec with a hard payload ceiling.
///
/// `decode` yields `Ok(None)` while the buffer holds less than a full frame
/// and leaves the buffered bytes in place, so it resumes on the next read.
/// A declared length above the ceiling is a `PayloadTooLarge` error; callers
/// drop the connection rather than try to resynchronise.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_payload: usize,
}

impl MessageCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = RealmError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let tag = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;

        if len > self.max_payload {
            return Err(RealmError::PayloadTooLarge {
                len,
                max: self.max_payload,
            });
        }

        let frame_len = HEADER_LEN + len;
        if src.len() < frame_len {
            // Make room for the rest of the frame before the next read
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Message { tag, payload }))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = RealmError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        if msg.payload.len() > self.max_payload {
            return Err(RealmError::PayloadTooLarge {
                len: msg.payload.len(),
                max: self.max_payload,
            });
        }
        dst.reserve(HEADER_LEN + msg.payload.len());
        dst.put_u32_le(msg.tag);
        dst.put_u32_le(msg.payload.len() as u32);
        dst.extend_from_slice(&msg.payload);
        Ok(())
    }
}

/// Encode a single frame into a fresh buffer
pub fn encode(tag: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32_le(tag);
    buf.put_u32_le(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf.freeze()
}
