//! Wire Protocol
//!
//! Workers and the coordinator exchange length-prefixed frames over TCP:
//!
//! ```text
//! +----------------------+---------------------------------------------+
//! | length: u32 (BE)     | bincode(Envelope { version: u16, message }) |
//! +----------------------+---------------------------------------------+
//! ```
//!
//! `Message` is a closed, tagged enum; nothing outside it can be decoded. A
//! declared length above the configured maximum, an unknown version or an
//! unparseable body is a `ProtocolError`, and the connection is dropped.

pub mod codec;
pub mod types;

pub use codec::{FrameCodec, LENGTH_PREFIX_BYTES, decode_message, encode_message};
pub use types::{ChunkPayload, Envelope, Message, PROTOCOL_VERSION};

#[cfg(test)]
mod tests;
