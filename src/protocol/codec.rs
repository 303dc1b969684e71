use super::types::{Envelope, Message, PROTOCOL_VERSION};
use crate::error::ProtocolError;

use bincode::Options;
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Length-prefixed bincode framing for `Message`, used on both ends.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if src.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_BYTES]);
        let len = u32::from_be_bytes(prefix) as usize;

        // Reject before buffering anything of an oversized frame.
        if len > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }

        if src.len() < LENGTH_PREFIX_BYTES + len {
            src.reserve(LENGTH_PREFIX_BYTES + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_BYTES);
        let body = src.split_to(len);
        decode_message(&body).map(Some)
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let body = encode_message(&message)?;
        if body.len() > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                len: body.len(),
                max: self.max_frame_bytes,
            });
        }

        dst.reserve(LENGTH_PREFIX_BYTES + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

/// Borrowing twin of `Envelope`; serializes to the same bytes.
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u16,
    message: &'a Message,
}

/// Encodes the frame body (no length prefix).
pub fn encode_message(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let envelope = EnvelopeRef {
        version: PROTOCOL_VERSION,
        message,
    };
    bincode::serialize(&envelope).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Same layout as `bincode::serialize`, but a body must be consumed exactly.
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Decodes a frame body, checking the version before the message itself.
///
/// The version prefix is read leniently; the full envelope must not leave
/// trailing bytes.
pub fn decode_message(body: &[u8]) -> Result<Message, ProtocolError> {
    let version: u16 =
        bincode::deserialize(body).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            found: version,
            expected: PROTOCOL_VERSION,
        });
    }

    let envelope: Envelope = wire_options()
        .deserialize(body)
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    Ok(envelope.message)
}
