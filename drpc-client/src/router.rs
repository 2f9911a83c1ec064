//! Event subscription registry and dispatch fan-out.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Error returned by an event handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked with the `data` of each matching dispatch.
pub type EventHandler = Arc<dyn Fn(&Value) -> Result<(), HandlerError> + Send + Sync>;

/// Registration key: event name plus a canonical fingerprint of the
/// subscription arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub event: String,
    pub fingerprint: String,
}

impl SubscriptionKey {
    pub fn new(event: impl Into<String>, args: &Value) -> Self {
        Self {
            event: event.into(),
            fingerprint: fingerprint(args),
        }
    }
}

/// Canonical text of subscription arguments; `null` and `{}` are the same.
pub fn fingerprint(args: &Value) -> String {
    match args {
        Value::Null => String::new(),
        Value::Object(map) if map.is_empty() => String::new(),
        other => {
            let mut out = String::new();
            write_canonical(other, &mut out);
            out
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Outcome of removing one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The handler was not registered (already removed or cleared).
    NotFound,
    /// Other handlers remain under the same key.
    Remaining(usize),
    /// That was the last handler for its key.
    Last,
}

/// A handler that failed while processing a dispatch.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub event: String,
    pub message: String,
}

/// Result of fanning out one dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

struct Registration {
    id: u64,
    handler: EventHandler,
}

struct Entry {
    args: Value,
    handlers: Vec<Registration>,
}

impl Entry {
    fn matches(&self, key: &SubscriptionKey, frame_args: Option<&Value>, data: &Value) -> bool {
        if key.fingerprint.is_empty() {
            return true;
        }
        if let Some(args) = frame_args {
            if fingerprint(args) == key.fingerprint {
                return true;
            }
        }
        // Filters such as {"channel_id": ..} match when the payload carries
        // the same values.
        match &self.args {
            Value::Object(filter) => filter.iter().all(|(k, v)| data.get(k) == Some(v)),
            _ => false,
        }
    }
}

/// Holds subscriptions and fans dispatches out to their handlers.
#[derive(Default)]
pub struct EventRouter {
    entries: Mutex<HashMap<SubscriptionKey, Entry>>,
    next_id: AtomicU64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler. Several handlers may share one key.
    pub fn register(
        &self,
        event: &str,
        args: Value,
        handler: EventHandler,
    ) -> (SubscriptionKey, u64) {
        let key = SubscriptionKey::new(event, &args);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.entries
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Entry {
                args,
                handlers: Vec::new(),
            })
            .handlers
            .push(Registration { id, handler });

        tracing::debug!("Registered handler {} for {}", id, event);
        (key, id)
    }

    /// Removes one handler.
    pub fn remove(&self, key: &SubscriptionKey, id: u64) -> Removal {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return Removal::NotFound;
        };

        let before = entry.handlers.len();
        entry.handlers.retain(|r| r.id != id);
        if entry.handlers.len() == before {
            return Removal::NotFound;
        }

        if entry.handlers.is_empty() {
            entries.remove(key);
            Removal::Last
        } else {
            Removal::Remaining(entry.handlers.len())
        }
    }

    /// Delivers a dispatch to every matching handler, in registration order.
    ///
    /// A failing or panicking handler is reported and does not stop delivery
    /// to the others.
    pub fn dispatch(&self, event: &str, frame_args: Option<&Value>, data: &Value) -> DispatchReport {
        let handlers: Vec<(u64, EventHandler)> = {
            let entries = self.entries.lock();
            let mut matched: Vec<(u64, EventHandler)> = entries
                .iter()
                .filter(|(key, entry)| key.event == event && entry.matches(key, frame_args, data))
                .flat_map(|(_, entry)| {
                    entry
                        .handlers
                        .iter()
                        .map(|r| (r.id, Arc::clone(&r.handler)))
                })
                .collect();
            matched.sort_by_key(|(id, _)| *id);
            matched
        };

        let mut report = DispatchReport::default();
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Handler {} for {} failed: {}", id, event, e);
                    report.failures.push(HandlerFailure {
                        event: event.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    tracing::warn!("Handler {} for {} panicked", id, event);
                    report.failures.push(HandlerFailure {
                        event: event.to_string(),
                        message: "handler panicked".to_string(),
                    });
                }
            }
        }
        report
    }

    /// Drops every registration. Returns how many handlers were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.values().map(|e| e.handlers.len()).sum();
        entries.clear();
        count
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(|e| e.handlers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (EventHandler, Arc<StdMutex<Vec<Value>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: EventHandler = Arc::new(move |data: &Value| {
            sink.lock().unwrap().push(data.clone());
            Ok(())
        });
        (handler, seen)
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = json!({"guild_id": "1", "channel_id": "2"});
        let b = json!({"channel_id": "2", "guild_id": "1"});
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&Value::Null), fingerprint(&json!({})));
        assert_ne!(fingerprint(&a), fingerprint(&json!({"guild_id": "1"})));
    }

    #[test]
    fn test_dispatch_in_arrival_order() {
        let router = EventRouter::new();
        let (handler, seen) = recorder();
        router.register("CHANNEL_CREATE", Value::Null, handler);

        for i in 0..3 {
            let report = router.dispatch("CHANNEL_CREATE", None, &json!({ "n": i }));
            assert_eq!(report.delivered, 1);
        }

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
    }

    #[test]
    fn test_other_events_not_delivered() {
        let router = EventRouter::new();
        let (handler, seen) = recorder();
        router.register("CHANNEL_CREATE", Value::Null, handler);

        let report = router.dispatch("GUILD_CREATE", None, &json!({}));
        assert_eq!(report.delivered, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_args_filter_matches_payload() {
        let router = EventRouter::new();
        let (handler, seen) = recorder();
        router.register("MESSAGE_CREATE", json!({"channel_id": "42"}), handler);

        router.dispatch("MESSAGE_CREATE", None, &json!({"channel_id": "7", "message": {}}));
        router.dispatch("MESSAGE_CREATE", None, &json!({"channel_id": "42", "message": {}}));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_args_filter_matches_frame_args() {
        let router = EventRouter::new();
        let (handler, seen) = recorder();
        router.register("VOICE_STATE_UPDATE", json!({"channel_id": "9"}), handler);

        let args = json!({"channel_id": "9"});
        router.dispatch("VOICE_STATE_UPDATE", Some(&args), &json!({"user": {}}));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_multiple_handlers_same_key() {
        let router = EventRouter::new();
        let (h1, seen1) = recorder();
        let (h2, seen2) = recorder();
        let (key, id1) = router.register("GUILD_STATUS", json!({"guild_id": "1"}), h1);
        let (key2, id2) = router.register("GUILD_STATUS", json!({"guild_id": "1"}), h2);
        assert_eq!(key, key2);

        router.dispatch("GUILD_STATUS", None, &json!({"guild_id": "1"}));
        assert_eq!(seen1.lock().unwrap().len(), 1);
        assert_eq!(seen2.lock().unwrap().len(), 1);

        assert_eq!(router.remove(&key, id1), Removal::Remaining(1));
        router.dispatch("GUILD_STATUS", None, &json!({"guild_id": "1"}));
        assert_eq!(seen1.lock().unwrap().len(), 1);
        assert_eq!(seen2.lock().unwrap().len(), 2);

        assert_eq!(router.remove(&key, id2), Removal::Last);
        assert_eq!(router.remove(&key, id2), Removal::NotFound);
        assert!(router.is_empty());
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let router = EventRouter::new();
        let failing: EventHandler = Arc::new(|_: &Value| Err("boom".into()));
        let panicking: EventHandler = Arc::new(|_: &Value| panic!("handler bug"));
        let (ok, seen) = recorder();

        router.register("ACTIVITY_JOIN", Value::Null, failing);
        router.register("ACTIVITY_JOIN", Value::Null, panicking);
        router.register("ACTIVITY_JOIN", Value::Null, ok);

        let report = router.dispatch("ACTIVITY_JOIN", None, &json!({"secret": "s"}));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].message, "boom");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let router = EventRouter::new();
        let (h1, _) = recorder();
        let (h2, _) = recorder();
        router.register("A", Value::Null, h1);
        router.register("B", Value::Null, h2);

        assert_eq!(router.len(), 2);
        assert_eq!(router.clear(), 2);
        assert!(router.is_empty());
    }
}
