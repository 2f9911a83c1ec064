//! # drpc-protocol
//!
//! Wire protocol for the local RPC interface of the desktop host.
//!
//! This crate provides:
//! - Opcode framing with a little-endian length prefix
//! - Resumable frame decoding over partial reads
//! - Command request/response and event dispatch payload types
//! - The activity (rich presence) value model and its validation rules

pub mod activity;
pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use activity::{
    Activity, ActivityAssets, ActivityButton, ActivityEmoji, ActivityFlags, ActivityParty,
    ActivitySecrets, ActivityTimestamps, ActivityType, StatusDisplayType, StatusEmoji,
};
pub use codec::{Decoder, Encoder};
pub use error::{ProtocolError, ValidationError};
pub use frame::{Frame, Opcode, FRAME_HEADER_SIZE};
pub use message::{Command, Handshake, Message, ReadyData, Request, RpcErrorData};

/// Protocol version announced in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum frame payload size (16 MiB).
///
/// A peer announcing more than this is treated as sending a malformed frame.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;
