//! Encoder and resumable decoder for frames.

use crate::error::ProtocolError;
use crate::frame::{Frame, Opcode};
use crate::message::{Handshake, Request};
use bytes::BytesMut;
use serde_json::Value;

/// Encodes handshakes, requests and control frames.
pub struct Encoder;

impl Encoder {
    /// Encodes the opcode-0 handshake.
    pub fn encode_handshake(handshake: &Handshake) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(Opcode::Handshake, handshake)?.encode()
    }

    /// Encodes a command request into a FRAME.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(Opcode::Frame, request)?.encode()
    }

    /// Encodes an arbitrary payload under the given opcode.
    pub fn encode_json<T: serde::Serialize>(
        opcode: Opcode,
        value: &T,
    ) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(opcode, value)?.encode()
    }

    /// Encodes a PONG echoing a PING payload.
    pub fn encode_pong(payload: &Value) -> Result<BytesMut, ProtocolError> {
        Frame::new(Opcode::Pong, payload.clone()).encode()
    }
}

/// Accumulates raw bytes and yields frames once they are complete.
///
/// The decoder never waits for input itself; the caller feeds bytes as they
/// arrive and drains frames until `decode_frame` returns `Ok(None)`.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
