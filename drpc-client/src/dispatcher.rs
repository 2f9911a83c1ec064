//! Request/response correlation.
//!
//! Every outbound command gets a nonce and a pending entry. The read loop
//! resolves entries as responses arrive; timeouts, local cancellation and
//! connection teardown remove them. Each entry is resolved exactly once.

use crate::error::ClientError;
use drpc_protocol::Message;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Outcome delivered to a waiting caller.
pub type Outcome = Result<Value, ClientError>;

/// An in-flight request.
struct PendingRequest {
    command: String,
    created_at: Instant,
    tx: oneshot::Sender<Outcome>,
}

/// Result of routing an inbound message through the dispatcher.
#[derive(Debug)]
pub enum Resolution {
    /// The message completed a pending request.
    Resolved,
    /// No pending request matched; the message is handed back.
    Unmatched(Message),
}

/// Tracks pending requests keyed by nonce.
#[derive(Default)]
pub struct RequestDispatcher {
    pending: Mutex<HashMap<String, PendingRequest>>,
}

impl RequestDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending request and returns its nonce and receiver.
    pub fn register(&self, command: &str) -> (String, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();

        let mut nonce = uuid::Uuid::new_v4().to_string();
        while pending.contains_key(&nonce) {
            nonce = uuid::Uuid::new_v4().to_string();
        }

        pending.insert(
            nonce.clone(),
            PendingRequest {
                command: command.to_string(),
                created_at: Instant::now(),
                tx,
            },
        );
        (nonce, rx)
    }

    /// Completes the pending request matching the message's nonce.
    pub fn resolve(&self, msg: Message) -> Resolution {
        let Some(nonce) = msg.nonce.clone() else {
            return Resolution::Unmatched(msg);
        };

        let Some(entry) = self.pending.lock().remove(&nonce) else {
            return Resolution::Unmatched(msg);
        };

        tracing::debug!(
            "Response for {} (nonce {}) after {:?}",
            entry.command,
            nonce,
            entry.created_at.elapsed()
        );

        let outcome = match msg.error_data() {
            Some(err) => Err(ClientError::Rpc {
                command: entry.command,
                nonce,
                code: err.code,
                message: err.message,
            }),
            None => Ok(msg.data),
        };

        // The caller may have stopped waiting; that is not an error here.
        let _ = entry.tx.send(outcome);
        Resolution::Resolved
    }

    /// Removes a pending request without resolving it.
    ///
    /// Only local delivery is suppressed; the host may still act on the
    /// command.
    pub fn cancel(&self, nonce: &str) -> bool {
        self.pending.lock().remove(nonce).is_some()
    }

    /// Returns a guard that cancels `nonce` when dropped.
    pub fn cancel_on_drop<'a>(&'a self, nonce: &'a str) -> CancelOnDrop<'a> {
        CancelOnDrop {
            dispatcher: self,
            nonce,
        }
    }

    /// Fails every pending request. Returns how many were failed.
    pub fn fail_all(&self, make_err: impl Fn() -> ClientError) -> usize {
        let drained: Vec<(String, PendingRequest)> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (nonce, entry) in drained {
            tracing::debug!("Failing {} (nonce {})", entry.command, nonce);
            let _ = entry.tx.send(Err(make_err()));
        }
        count
    }

    /// Waits for the outcome of a registered request.
    ///
    /// Dropping the returned future cancels the request locally.
    pub async fn wait(
        &self,
        command: &str,
        nonce: &str,
        rx: oneshot::Receiver<Outcome>,
        timeout: Option<Duration>,
    ) -> Outcome {
        let guard = self.cancel_on_drop(nonce);

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::debug!("{} (nonce {}) timed out after {:?}", command, nonce, limit);
                    drop(guard);
                    return Err(ClientError::Timeout {
                        command: command.to_string(),
                        nonce: nonce.to_string(),
                    });
                }
            },
            None => rx.await,
        };

        // A dropped sender means the entry was discarded without an outcome.
        received.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Returns the number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes the pending entry if the waiting future goes away early.
pub struct CancelOnDrop<'a> {
    dispatcher: &'a RequestDispatcher,
    nonce: &'a str,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.dispatcher.cancel(self.nonce) {
            tracing::debug!("Request nonce {} cancelled locally", self.nonce);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_response_resolves_matching_nonce() {
        let dispatcher = RequestDispatcher::new();
        let (nonce, rx) = dispatcher.register("GET_GUILDS");
        assert_eq!(dispatcher.len(), 1);

        let msg = Message::response("GET_GUILDS", &nonce, json!({"guilds": []}));
        assert!(matches!(dispatcher.resolve(msg), Resolution::Resolved));

        let value = dispatcher.wait("GET_GUILDS", &nonce, rx, None).await.unwrap();
        assert_eq!(value, json!({"guilds": []}));
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_error_response_becomes_rpc_error() {
        let dispatcher = RequestDispatcher::new();
        let (nonce, rx) = dispatcher.register("GET_GUILD");

        dispatcher.resolve(Message::error("GET_GUILD", &nonce, 4000, "Invalid guild"));

        let err = dispatcher.wait("GET_GUILD", &nonce, rx, None).await.unwrap_err();
        match err {
            ClientError::Rpc {
                command,
                nonce: n,
                code,
                message,
            } => {
                assert_eq!(command, "GET_GUILD");
                assert_eq!(n, nonce);
                assert_eq!(code, 4000);
                assert_eq!(message, "Invalid guild");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_nonce_is_handed_back() {
        let dispatcher = RequestDispatcher::new();
        let (nonce, mut rx) = dispatcher.register("GET_GUILDS");

        let stray = Message::response("GET_GUILDS", "not-a-nonce", json!({}));
        assert!(matches!(dispatcher.resolve(stray), Resolution::Unmatched(_)));

        assert_eq!(dispatcher.len(), 1);
        assert!(rx.try_recv().is_err());
        assert!(dispatcher.cancel(&nonce));
    }

    #[tokio::test]
    async fn test_duplicate_response_is_unmatched() {
        let dispatcher = RequestDispatcher::new();
        let (nonce, _rx) = dispatcher.register("GET_GUILDS");

        let msg = Message::response("GET_GUILDS", &nonce, json!({}));
        assert!(matches!(dispatcher.resolve(msg.clone()), Resolution::Resolved));
        assert!(matches!(dispatcher.resolve(msg), Resolution::Unmatched(_)));
    }

    #[tokio::test]
    async fn test_interleaved_responses_reach_their_callers() {
        let dispatcher = Arc::new(RequestDispatcher::new());
        let mut waiters = Vec::new();
        let mut nonces = Vec::new();

        for i in 0..16 {
            let (nonce, rx) = dispatcher.register("GET_CHANNEL");
            nonces.push((i, nonce.clone()));
            let d = dispatcher.clone();
            waiters.push(tokio::spawn(async move {
                (i, d.wait("GET_CHANNEL", &nonce, rx, None).await.unwrap())
            }));
        }

        // Answer in reverse order.
        for (i, nonce) in nonces.iter().rev() {
            dispatcher.resolve(Message::response("GET_CHANNEL", nonce, json!({ "id": i })));
        }

        for waiter in waiters {
            let (i, value) = waiter.await.unwrap();
            assert_eq!(value["id"], i);
        }
        assert!(dispatcher.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let dispatcher = RequestDispatcher::new();
        let (nonce, rx) = dispatcher.register("GET_GUILDS");

        let err = dispatcher
            .wait("GET_GUILDS", &nonce, rx, Some(Duration::from_secs(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout { .. }));
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_pending_request() {
        let dispatcher = Arc::new(RequestDispatcher::new());
        let mut waiters = Vec::new();

        for _ in 0..5 {
            let (nonce, rx) = dispatcher.register("GET_GUILDS");
            let d = dispatcher.clone();
            waiters.push(tokio::spawn(async move {
                d.wait("GET_GUILDS", &nonce, rx, None).await
            }));
        }

        tokio::task::yield_now().await;
        assert_eq!(dispatcher.fail_all(|| ClientError::ConnectionClosed), 5);

        for waiter in waiters {
            let result = waiter.await.unwrap();
            assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        }
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_waiter_cancels_entry() {
        let dispatcher = RequestDispatcher::new();
        let (nonce, rx) = dispatcher.register("AUTHORIZE");

        {
            let fut = dispatcher.wait("AUTHORIZE", &nonce, rx, None);
            // Poll once so the guard exists, then drop the future.
            let _ = futures_poll_once(fut).await;
        }

        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_guard_cancels_before_wait() {
        let dispatcher = RequestDispatcher::new();
        let (nonce, _rx) = dispatcher.register("SET_VOICE_SETTINGS");
        {
            let _guard = dispatcher.cancel_on_drop(&nonce);
            assert_eq!(dispatcher.len(), 1);
        }
        assert!(dispatcher.is_empty());
    }

    async fn futures_poll_once<F: std::future::Future>(fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = fut => Some(out),
            _ = std::future::ready(()) => None,
        }
    }
}
