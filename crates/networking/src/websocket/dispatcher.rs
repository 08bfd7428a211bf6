//! Inbound frame parsing and single-subscriber fan-out

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use threatfeed_core::Message;
use tracing::{error, trace};

/// Callback invoked synchronously for every parsed message
pub type Subscriber = Arc<dyn Fn(&Message) + Send + Sync>;

/// Parses frames, keeps a rolling introspection log, and forwards each
/// message to the current subscriber (at most one).
///
/// Malformed frames are logged and counted, never propagated.
pub struct MessageDispatcher {
    subscriber: RwLock<Option<Subscriber>>,
    log: Mutex<VecDeque<Message>>,
    log_capacity: usize,
    dispatched: AtomicU64,
    malformed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl MessageDispatcher {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            subscriber: RwLock::new(None),
            log: Mutex::new(VecDeque::with_capacity(log_capacity)),
            log_capacity,
            dispatched: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Register the subscriber, replacing (without notice) any previous one
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.subscriber.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    pub fn unsubscribe(&self) {
        if let Ok(mut slot) = self.subscriber.write() {
            *slot = None;
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Handle one inbound text frame. Returns the parsed message, or `None`
    /// if the frame was discarded.
    pub fn dispatch(&self, raw: &str) -> Option<Message> {
        let message = match Message::from_json(raw) {
            Ok(message) => message,
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, len = raw.len(), "Discarding malformed live-update frame");
                if let Ok(mut last) = self.last_error.lock() {
                    *last = Some(e.to_string());
                }
                return None;
            }
        };

        trace!(kind = message.kind(), "Dispatching live-update message");
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut log) = self.log.lock() {
            if log.len() >= self.log_capacity {
                log.pop_front();
            }
            if self.log_capacity > 0 {
                log.push_back(message.clone());
            }
        }

        // Clone out of the slot so the callback may re-subscribe
        let subscriber = self.subscriber.read().ok().and_then(|s| s.clone());
        if let Some(callback) = subscriber {
            callback(&message);
        }

        Some(message)
    }

    /// Introspection log, oldest first
    pub fn recent_messages(&self) -> Vec<Message> {
        self.log
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new(threatfeed_core::config::DEFAULT_MESSAGE_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const PONG: &str = r#"{"type":"pong","timestamp":"2024-05-01T10:00:00"}"#;

    #[test]
    fn test_malformed_frame_is_discarded() {
        let dispatcher = MessageDispatcher::new(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        dispatcher.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(dispatcher.dispatch("{not json").is_none());
        assert!(dispatcher.dispatch(r#"{"type":"unknown_kind"}"#).is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.malformed_count(), 2);
        assert!(dispatcher.last_error().is_some());
        assert!(dispatcher.recent_messages().is_empty());
    }

    #[test]
    fn test_subscriber_replacement() {
        let dispatcher = MessageDispatcher::new(10);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        dispatcher.subscribe(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.dispatch(PONG);

        let s = second.clone();
        dispatcher.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.dispatch(PONG);
        dispatcher.dispatch(PONG);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);

        dispatcher.unsubscribe();
        assert!(!dispatcher.has_subscriber());
        assert!(dispatcher.dispatch(PONG).is_some());
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_log_is_bounded_and_ordered() {
        let dispatcher = MessageDispatcher::new(3);
        for i in 0..5 {
            dispatcher.dispatch(&format!(r#"{{"type":"pong","timestamp":"t{}"}}"#, i));
        }

        let log = dispatcher.recent_messages();
        assert_eq!(log.len(), 3);
        assert_eq!(
            log[0],
            Message::Pong {
                timestamp: Some("t2".into())
            }
        );
        assert_eq!(dispatcher.dispatched_count(), 5);
    }

    #[test]
    fn test_dispatch_without_subscriber() {
        let dispatcher = MessageDispatcher::default();
        assert!(dispatcher.dispatch(PONG).is_some());
        assert_eq!(dispatcher.recent_messages().len(), 1);
    }
}
