//! Protocol error types and activity validation errors.

use thiserror::Error;

/// Protocol-level errors that can occur during framing or message handling.
///
/// Every variant is fatal for the connection it was raised on: once the byte
/// stream is out of sync there is no way to find the next frame boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("unexpected opcode: {0}")]
    UnexpectedOpcode(u32),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }
}

/// Activity validation failures, raised before a payload is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is {len} characters long (allowed {min}..={max})")]
    Length {
        field: &'static str,
        len: usize,
        min: usize,
        max: usize,
    },

    #[error("party size must be at least 1")]
    EmptyParty,

    #[error("party size {size} exceeds party max {max}")]
    PartySize { size: u32, max: u32 },

    #[error("too many buttons: {count} (max {max})")]
    TooManyButtons { count: usize, max: usize },

    #[error("buttons cannot be combined with secrets")]
    ButtonsWithSecrets,

    #[error("url is only allowed for streaming activities")]
    UrlNotStreaming,

    #[error("timestamp start {start} is after end {end}")]
    TimestampOrder { start: i64, end: i64 },
}
