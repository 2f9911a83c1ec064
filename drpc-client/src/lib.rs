//! # drpc-client
//!
//! Client for the local RPC interface of the desktop host.
//!
//! This crate provides:
//! - IPC transport discovery (UNIX sockets, Windows named pipes)
//! - Handshake, request/response correlation and event subscriptions over
//!   one long-lived connection
//! - Activity (rich presence) updates with host rate limiting
//! - OAuth2 login and URL-scheme registration helpers

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod oauth;
pub mod rate_limit;
pub mod register;
pub mod router;
pub mod session;
pub mod state;
pub mod transport;

pub use config::{ActivityPolicy, SessionConfig};
pub use connection::Connection;
pub use error::ClientError;
pub use oauth::{AccessToken, HttpTokenExchange, TokenExchange, TokenRequest};
pub use rate_limit::ActivityOutcome;
pub use register::register;
pub use router::HandlerError;
pub use session::{
    LobbyType, LobbyUpdate, LoginOptions, RpcToken, Session, ShortcutCapture, Subscription,
};
pub use state::{SessionEvent, SessionState};
pub use transport::{IpcTransport, StreamTransport, Transport};
