//! Opcode + length framing for relayed IPC messages.
//!
//! Every message is framed with:
//! - A 4-byte little-endian opcode
//! - A 4-byte little-endian payload length
//!
//! followed by exactly that many payload bytes. Payloads are opaque to this
//! layer and larger-than-configured frames are rejected, never truncated.
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod opcode;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, Header, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use opcode::{opcode_name, Opcode, CLOSE, FRAME, HANDSHAKE, PING, PONG};
pub use reader::FrameReader;
pub use writer::FrameWriter;
