//! Activity update rate limiting.
//!
//! The host accepts one activity update per interval. An update arriving
//! while the connection is idle goes out at once; updates inside the window
//! either replace the queued one (coalesce) or fail (reject). The queued
//! update is sent at `last_sent + interval`.

use crate::config::ActivityPolicy;
use crate::error::ClientError;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// What happened to a submitted activity update.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    /// The update was sent; carries the host's response data.
    Sent(Value),
    /// A newer update replaced this one before it was sent.
    Superseded,
}

/// Result delivered to a caller whose update was queued.
pub type ActivityResult = Result<ActivityOutcome, ClientError>;

/// Decision for a submitted update.
#[derive(Debug)]
pub enum Admission {
    /// Send these args now; the window has already been charged.
    Immediate(Value),
    /// Queued behind the window. `flush_at` is set when the caller must
    /// schedule the flush; otherwise one is already scheduled.
    Queued {
        rx: oneshot::Receiver<ActivityResult>,
        flush_at: Option<Instant>,
    },
    /// Rejected under [`ActivityPolicy::Reject`].
    Rejected { retry_after: Duration },
}

/// A queued update taken out for sending.
#[derive(Debug)]
pub struct QueuedUpdate {
    pub args: Value,
    pub tx: oneshot::Sender<ActivityResult>,
}

#[derive(Default)]
struct LimiterState {
    last_sent: Option<Instant>,
    queued: Option<QueuedUpdate>,
    flush_scheduled: bool,
}

/// Per-connection activity rate limiter.
pub struct ActivityRateLimiter {
    interval: Duration,
    policy: ActivityPolicy,
    state: Mutex<LimiterState>,
}

impl ActivityRateLimiter {
    pub fn new(interval: Duration, policy: ActivityPolicy) -> Self {
        Self {
            interval,
            policy,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Submits an update.
    pub fn admit(&self, args: Value) -> Admission {
        self.admit_at(args, Instant::now())
    }

    /// Internal: admit with an explicit timestamp (for testing).
    fn admit_at(&self, args: Value, now: Instant) -> Admission {
        let mut state = self.state.lock();

        let window_open_at = state.last_sent.map(|t| t + self.interval);
        let idle = state.queued.is_none()
            && !state.flush_scheduled
            && window_open_at.map_or(true, |at| now >= at);

        if idle {
            state.last_sent = Some(now);
            return Admission::Immediate(args);
        }

        let flush_at = window_open_at.unwrap_or(now).max(now);

        if self.policy == ActivityPolicy::Reject {
            return Admission::Rejected {
                retry_after: flush_at.saturating_duration_since(now),
            };
        }

        let (tx, rx) = oneshot::channel();
        if let Some(previous) = state.queued.replace(QueuedUpdate { args, tx }) {
            tracing::debug!("Activity update superseded before sending");
            let _ = previous.tx.send(Ok(ActivityOutcome::Superseded));
        }

        let schedule = if state.flush_scheduled {
            None
        } else {
            state.flush_scheduled = true;
            Some(flush_at)
        };

        Admission::Queued {
            rx,
            flush_at: schedule,
        }
    }

    /// Takes the queued update when its flush fires and charges the window.
    pub fn take_due(&self) -> Option<QueuedUpdate> {
        self.take_due_at(Instant::now())
    }

    fn take_due_at(&self, now: Instant) -> Option<QueuedUpdate> {
        let mut state = self.state.lock();
        state.flush_scheduled = false;
        let update = state.queued.take()?;
        state.last_sent = Some(now);
        Some(update)
    }

    /// Fails the queued update, if any.
    pub fn fail_pending(&self, err: ClientError) -> bool {
        let mut state = self.state.lock();
        state.flush_scheduled = false;
        match state.queued.take() {
            Some(update) => {
                let _ = update.tx.send(Err(err));
                true
            }
            None => false,
        }
    }

    /// Returns true if an update is waiting for the window.
    pub fn has_pending(&self) -> bool {
        self.state.lock().queued.is_some()
    }
}
