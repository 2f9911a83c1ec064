//! Session lifecycle state and observer events.

use drpc_protocol::ReadyData;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Authenticating,
    Ready,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        }
    }

    /// Returns true while a connection is open or being opened.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Disconnected | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state cell, written by the session and by connection teardown.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<RwLock<SessionState>>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(RwLock::new(SessionState::Disconnected)))
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.0.read()
    }

    pub(crate) fn set(&self, next: SessionState) {
        let mut state = self.0.write();
        if *state != next {
            tracing::debug!("Session state {} -> {}", *state, next);
            *state = next;
        }
    }

    /// Moves to `next` only if the current state is `expected`.
    pub(crate) fn transition(&self, expected: SessionState, next: SessionState) -> bool {
        let mut state = self.0.write();
        if *state != expected {
            return false;
        }
        tracing::debug!("Session state {} -> {}", expected, next);
        *state = next;
        true
    }
}

/// Lifecycle notification delivered to observers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Handshake completed.
    Ready(ReadyData),
    /// AUTHENTICATE succeeded.
    Authenticated {
        user: Option<Value>,
        application: Option<Value>,
    },
    /// A dispatch no subscription handled.
    Dispatch { event: String, data: Value },
    /// A subscription handler returned an error or panicked.
    HandlerFailed { event: String, message: String },
    /// The connection ended.
    Disconnected { code: Option<i64>, reason: String },
    /// A fatal connection error, followed by `Disconnected`.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_only_from_expected() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), SessionState::Disconnected);
        assert!(!cell.transition(SessionState::Authenticating, SessionState::Ready));

        cell.set(SessionState::Authenticating);
        assert!(cell.transition(SessionState::Authenticating, SessionState::Ready));
        assert_eq!(cell.get(), SessionState::Ready);
    }

    #[test]
    fn test_is_active() {
        assert!(SessionState::Ready.is_active());
        assert!(SessionState::Handshaking.is_active());
        assert!(!SessionState::Closed.is_active());
        assert!(!SessionState::Disconnected.is_active());
    }
}
