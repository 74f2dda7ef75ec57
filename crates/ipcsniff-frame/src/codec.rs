use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::opcode::{opcode_name, Opcode};

/// Frame header: opcode (4) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size: 64 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// One relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw opcode; see [`crate::opcode`] for the defined values.
    pub opcode: u32,
    /// The message payload, forwarded verbatim.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(opcode: impl Into<u32>, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode: opcode.into(),
            payload: payload.into(),
        }
    }

    /// The opcode, if it is one the protocol defines.
    pub fn kind(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }

    pub fn opcode_name(&self) -> &'static str {
        opcode_name(self.opcode)
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: u32,
    pub len: u32,
}

impl Header {
    /// Parse a header and validate the declared length against `max_payload`.
    ///
    /// An oversized length is a protocol violation: the stream cannot be
    /// resynchronised, so the caller must drop the connection.
    pub fn parse(bytes: &[u8; HEADER_SIZE], max_payload: usize) -> Result<Self> {
        let mut buf = &bytes[..];
        let opcode = buf.get_u32_le();
        let len = buf.get_u32_le();

        if len as usize > max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: len as usize,
                max: max_payload,
            });
        }

        Ok(Self { opcode, len })
    }

    pub fn payload_len(&self) -> usize {
        self.len as usize
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ Opcode       │ Length       │ Payload          │
/// │ (4B LE)      │ (4B LE)      │ (Length bytes)   │
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(
    opcode: u32,
    payload: &[u8],
    dst: &mut BytesMut,
    max_payload: usize,
) -> Result<()> {
    let max = max_payload.min(u32::MAX as usize);
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(opcode);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(header_bytes) = src.get(..HEADER_SIZE) else {
        return Ok(None); // Need more data
    };
    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(header_bytes);
    let header = Header::parse(&raw, max_payload)?;

    let total = HEADER_SIZE + header.payload_len();
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.payload_len()).freeze();

    Ok(Some(Frame {
        opcode: header.opcode,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 64 KiB.
    pub max_payload_size: usize,
    /// Read deadline applied to the underlying stream.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{FRAME, HANDSHAKE, PING};

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = br#"{"cmd":"DISPATCH","evt":"READY"}"#;

        encode_frame(FRAME, payload, &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + payload.len());

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(frame, Frame::new(FRAME, Bytes::from_static(payload)));
        assert_eq!(frame.kind(), Some(Opcode::Frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_is_little_endian() {
        let mut buf = BytesMut::new();
        encode_frame(PING, b"abc", &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(&buf[..HEADER_SIZE], &[3, 0, 0, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x01, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(FRAME, b"hello", &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_encode_payload_too_large() {
        let mut buf = BytesMut::new();
        let result = encode_frame(FRAME, &[0u8; 17], &mut buf, 16);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 17, max: 16 })
        ));
        assert!(buf.is_empty(), "nothing may be written for a rejected frame");
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(FRAME);
        buf.put_u32_le(DEFAULT_MAX_PAYLOAD as u32 + 1);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_payload_at_bound_is_accepted() {
        let payload = vec![0x5A; 32];
        let mut buf = BytesMut::new();
        encode_frame(FRAME, &payload, &mut buf, 32).unwrap();
        let frame = decode_frame(&mut buf, 32).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 32);
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(HANDSHAKE, b"first", &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        encode_frame(FRAME, b"second", &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f1.opcode, HANDSHAKE);
        assert_eq!(f1.payload.as_ref(), b"first");

        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f2.opcode, FRAME);
        assert_eq!(f2.payload.as_ref(), b"second");

        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_opcode_passes_through() {
        let mut buf = BytesMut::new();
        encode_frame(77, b"opaque", &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.opcode, 77);
        assert_eq!(frame.kind(), None);
        assert_eq!(frame.opcode_name(), "UNKNOWN");
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(PING, b"", &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.opcode, PING);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(FRAME, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
    }
}
