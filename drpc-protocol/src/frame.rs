//! Binary frame format.
//!
//! Frame layout (8 bytes header + payload):
//!
//! ```text
//! +-----------+-------------+------------------------------+
//! |  opcode   | payload_len | payload (UTF-8 JSON)         |
//! | 4 bytes LE|  4 bytes LE | payload_len bytes            |
//! +-----------+-------------+------------------------------+
//! ```

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use std::fmt;

/// Size of the fixed frame header in bytes (4 + 4 = 8).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl Opcode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(ProtocolError::UnexpectedOpcode(other)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Handshake => write!(f, "HANDSHAKE"),
            Opcode::Frame => write!(f, "FRAME"),
            Opcode::Close => write!(f, "CLOSE"),
            Opcode::Ping => write!(f, "PING"),
            Opcode::Pong => write!(f, "PONG"),
        }
    }
}

/// A parsed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame opcode.
    pub opcode: Opcode,
    /// Decoded JSON payload.
    pub payload: Value,
}

impl Frame {
    /// Creates a new frame with the given payload.
    pub fn new(opcode: Opcode, payload: Value) -> Self {
        Self { opcode, payload }
    }

    /// Creates a new frame from a JSON-serializable value.
    pub fn from_json<T: serde::Serialize>(opcode: Opcode, value: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(opcode, serde_json::to_value(value)?))
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let payload = serde_json::to_vec(&self.payload)?;
        let payload_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
        buf.put_u32_le(self.opcode.as_u32());
        buf.put_u32_le(payload_len);
        buf.put_slice(&payload);

        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// Nothing is consumed from `buf` unless a whole frame is available.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at header without consuming
        let opcode_raw = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let opcode = Opcode::try_from(opcode_raw)?;

        let payload_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total_len = FRAME_HEADER_SIZE + payload_len as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let raw = buf.split_to(payload_len as usize).freeze();

        let text = std::str::from_utf8(&raw).map_err(|_| ProtocolError::InvalidUtf8)?;
        let payload = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text)
                .map_err(|e| ProtocolError::malformed(format!("undecodable payload: {e}")))?
        };

        Ok(Some(Self { opcode, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_frame_roundtrip() {
        let payload = json!({"cmd": "GET_GUILDS", "args": {}, "nonce": "1"});
        let frame = Frame::new(Opcode::Frame, payload.clone());

        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.opcode, Opcode::Frame);
        assert_eq!(decoded.payload, payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_is_little_endian() {
        let frame = Frame::new(Opcode::Close, json!({}));
        let encoded = frame.encode().unwrap();

        assert_eq!(&encoded[0..4], &[2, 0, 0, 0]);
        assert_eq!(&encoded[4..8], &[2, 0, 0, 0]);
        assert_eq!(&encoded[8..], b"{}");
    }

    #[test]
    fn test_handshake_bytes() {
        let frame = Frame::new(Opcode::Handshake, json!({"client_id": "123", "v": 1}));
        let encoded = frame.encode().unwrap();
        let body = br#"{"client_id":"123","v":1}"#;

        assert_eq!(&encoded[0..4], &0u32.to_le_bytes());
        assert_eq!(&encoded[4..8], &(body.len() as u32).to_le_bytes());
        assert_eq!(&encoded[8..], body);
    }

    #[test]
    fn test_unexpected_opcode() {
        let mut buf = BytesMut::from(&b"\x09\x00\x00\x00\x02\x00\x00\x00{}"[..]);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnexpectedOpcode(9))));
    }

    #[test]
    fn test_incomplete_header() {
        let mut buf = BytesMut::from(&b"\x01\x00\x00"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_incomplete_payload_is_not_consumed() {
        let mut buf = BytesMut::from(&b"\x01\x00\x00\x00\x0a\x00\x00\x00{\"a\""[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn test_undecodable_payload() {
        let mut buf = BytesMut::from(&b"\x01\x00\x00\x00\x03\x00\x00\x00{x}"[..]);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
    }

    #[test]
    fn test_invalid_utf8_payload() {
        let mut buf = BytesMut::from(&b"\x01\x00\x00\x00\x02\x00\x00\x00\xff\xfe"[..]);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_announced_length_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(1);
        buf.put_u32_le(MAX_PAYLOAD_SIZE + 1);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_frame_too_large_on_encode() {
        let frame = Frame::new(
            Opcode::Frame,
            Value::String("x".repeat(MAX_PAYLOAD_SIZE as usize + 1)),
        );
        assert!(matches!(
            frame.encode(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_payload_decodes_to_null() {
        let mut buf = BytesMut::from(&b"\x03\x00\x00\x00\x00\x00\x00\x00"[..]);
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.opcode, Opcode::Ping);
        assert_eq!(decoded.payload, Value::Null);
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let frame1 = Frame::new(Opcode::Ping, json!({"id": 1}));
        let frame2 = Frame::new(Opcode::Frame, json!({"id": 2}));

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame1.encode().unwrap());
        buf.extend_from_slice(&frame2.encode().unwrap());

        assert_eq!(Frame::decode(&mut buf).unwrap().unwrap(), frame1);
        assert_eq!(Frame::decode(&mut buf).unwrap().unwrap(), frame2);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(Opcode::Handshake.to_string(), "HANDSHAKE");
        assert_eq!(Opcode::Pong.to_string(), "PONG");
        assert_eq!(Opcode::try_from(3).unwrap(), Opcode::Ping);
    }

    fn opcode_strategy() -> impl Strategy<Value = Opcode> {
        prop_oneof![
            Just(Opcode::Handshake),
            Just(Opcode::Frame),
            Just(Opcode::Close),
            Just(Opcode::Ping),
            Just(Opcode::Pong),
        ]
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_frames(
            frames in prop::collection::vec((opcode_strategy(), "[a-z0-9 ]{0,64}", any::<i64>()), 1..6),
            chunk in 1usize..17,
        ) {
            let frames: Vec<Frame> = frames
                .into_iter()
                .map(|(op, text, n)| Frame::new(op, json!({"text": text, "n": n})))
                .collect();

            let mut wire = Vec::new();
            for frame in &frames {
                wire.extend_from_slice(&frame.encode().unwrap());
            }

            let mut buf = BytesMut::new();
            let mut decoded = Vec::new();
            for piece in wire.chunks(chunk) {
                buf.extend_from_slice(piece);
                while let Some(frame) = Frame::decode(&mut buf).unwrap() {
                    decoded.push(frame);
                }
            }

            prop_assert_eq!(decoded, frames);
            prop_assert!(buf.is_empty());
        }
    }
}
