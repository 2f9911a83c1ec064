//! Client error types.

use std::time::Duration;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to host: {0}")]
    Connect(#[source] std::io::Error),

    #[error("handshake failed: {reason}")]
    HandshakeFailed { reason: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] drpc_protocol::ProtocolError),

    #[error("{command} failed (nonce {nonce}): [{code}] {message}")]
    Rpc {
        command: String,
        nonce: String,
        code: i64,
        message: String,
    },

    #[error("{command} timed out (nonce {nonce})")]
    Timeout { command: String, nonce: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("login failed: {0}")]
    LoginFailed(#[source] Box<ClientError>),

    #[error("activity update rate limited, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("invalid activity: {0}")]
    Validation(#[from] drpc_protocol::ValidationError),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns whether trying again later may succeed.
    ///
    /// A hint for callers only: the client never retries on its own, so a
    /// failed connect or a lost connection stays failed until the caller
    /// connects again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connect(_) => true,
            ClientError::Io(_) => true,
            ClientError::Timeout { .. } => true,
            ClientError::ConnectionClosed => true,
            ClientError::RateLimited { .. } => true,
            ClientError::LoginFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Returns whether this error ends the connection it was raised on.
    ///
    /// Request-level failures (`Rpc`, `Timeout`, `RateLimited`, `Validation`)
    /// only concern the one caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Connect(_)
                | ClientError::HandshakeFailed { .. }
                | ClientError::Protocol(_)
                | ClientError::ConnectionClosed
                | ClientError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_display_carries_context() {
        let err = ClientError::Rpc {
            command: "GET_GUILD".to_string(),
            nonce: "n1".to_string(),
            code: 4000,
            message: "Invalid guild".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("GET_GUILD"));
        assert!(msg.contains("n1"));
        assert!(msg.contains("4000"));
    }

    #[test]
    fn test_classification() {
        let timeout = ClientError::Timeout {
            command: "GET_GUILDS".to_string(),
            nonce: "n".to_string(),
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_fatal());

        assert!(ClientError::ConnectionClosed.is_fatal());
        assert!(ClientError::HandshakeFailed {
            reason: "closed".to_string()
        }
        .is_fatal());
        assert!(!ClientError::NotConnected.is_fatal());

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no host");
        assert!(ClientError::Connect(refused).is_retryable());

        let login = ClientError::LoginFailed(Box::new(ClientError::ConnectionClosed));
        assert!(login.is_retryable());
        assert!(login.to_string().contains("connection closed"));
    }
}
