//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Minimum interval between two activity updates accepted by the host.
pub const DEFAULT_ACTIVITY_INTERVAL: Duration = Duration::from_secs(15);

/// What to do with an activity update that arrives inside the rate window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPolicy {
    /// Keep only the latest update and send it when the window closes.
    #[default]
    Coalesce,
    /// Fail the update with `RateLimited`.
    Reject,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application client id sent in the handshake.
    pub client_id: String,
    /// Explicit IPC socket/pipe path (skips discovery).
    pub ipc_path: Option<PathBuf>,
    /// Time allowed for the transport connect plus the READY dispatch.
    pub handshake_timeout: Duration,
    /// Timeout for ordinary requests.
    pub request_timeout: Duration,
    /// Timeout for AUTHORIZE, which waits on the user. `None` waits forever.
    pub authorize_timeout: Option<Duration>,
    /// Minimum interval between activity updates.
    pub activity_interval: Duration,
    /// Rate-limit policy for activity updates.
    pub activity_policy: ActivityPolicy,
    /// Read buffer size for transport reads.
    pub read_buffer_size: usize,
    /// Capacity of the lifecycle event channel.
    pub event_channel_capacity: usize,
}

impl SessionConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ipc_path: None,
            handshake_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            authorize_timeout: None,
            activity_interval: DEFAULT_ACTIVITY_INTERVAL,
            activity_policy: ActivityPolicy::Coalesce,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            event_channel_capacity: 256,
        }
    }

    pub fn with_ipc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ipc_path = Some(path.into());
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_authorize_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.authorize_timeout = timeout;
        self
    }

    pub fn with_activity_interval(mut self, interval: Duration) -> Self {
        self.activity_interval = interval;
        self
    }

    pub fn with_activity_policy(mut self, policy: ActivityPolicy) -> Self {
        self.activity_policy = policy;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::new("123");
        assert_eq!(config.client_id, "123");
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.authorize_timeout, None);
        assert_eq!(config.activity_interval, Duration::from_secs(15));
        assert_eq!(config.activity_policy, ActivityPolicy::Coalesce);
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = SessionConfig::new("123").with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = SessionConfig::new("123").with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_event_capacity_never_zero() {
        let config = SessionConfig::new("123").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }
}
