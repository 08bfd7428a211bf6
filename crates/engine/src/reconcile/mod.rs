//! Reconciliation of push-sourced and polled data
//!
//! Live messages land in bounded buffers; REST snapshots replace the polled
//! side wholesale. After every change the merged views are recomputed and
//! published on a watch channel. Consumers only ever read `MergedState`.

mod live_buffer;
mod merge;

pub use live_buffer::LiveBuffer;
pub use merge::merged_view;

use crate::notify::{Notification, NotificationConfig, NotificationEmitter};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use threatfeed_core::{Alert, EventRecord, Message, PipelineStatus, SnapshotKind, UserRisk};
use threatfeed_persistence::SnapshotCaches;
use tokio::sync::watch;
use tracing::{debug, info};

/// Consumer-visible result of reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedState {
    pub alerts: Vec<Alert>,
    pub events: Vec<EventRecord>,
    pub pipeline: Option<PipelineStatus>,
    pub risk_by_user: Vec<UserRisk>,
    /// Live alerts not yet marked seen
    pub new_alert_ids: BTreeSet<String>,
}

impl MergedState {
    pub fn is_new(&self, alert_id: &str) -> bool {
        self.new_alert_ids.contains(alert_id)
    }
}

/// Owns the live buffers and snapshots
pub struct Reconciler {
    live_alerts: LiveBuffer<Alert>,
    live_events: LiveBuffer<EventRecord>,
    alert_snapshot: Vec<Alert>,
    event_snapshot: Vec<EventRecord>,
    pipeline: Option<PipelineStatus>,
    risk_by_user: Vec<UserRisk>,
    new_alert_ids: BTreeSet<String>,
    caches: Arc<SnapshotCaches>,
    notifications: NotificationConfig,
    state_tx: watch::Sender<MergedState>,
}

impl Reconciler {
    pub fn new(
        capacity: usize,
        caches: Arc<SnapshotCaches>,
        notifications: NotificationConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(MergedState::default());
        Self {
            live_alerts: LiveBuffer::new(capacity),
            live_events: LiveBuffer::new(capacity),
            alert_snapshot: Vec::new(),
            event_snapshot: Vec::new(),
            pipeline: None,
            risk_by_user: Vec::new(),
            new_alert_ids: BTreeSet::new(),
            caches,
            notifications,
            state_tx,
        }
    }

    /// Apply one dispatched message. Returns the notification to emit, if any.
    pub fn apply(&mut self, message: &Message) -> Option<Notification> {
        match message {
            Message::NewAlert { alert } => {
                debug!(alert_id = %alert.alert_id, "Live alert received");
                self.live_alerts.push(alert.clone());
                self.new_alert_ids.insert(alert.alert_id.clone());
                self.forget_evicted_flags();
                self.caches.invalidate(SnapshotKind::Alerts);

                let notification = Notification::for_alert(alert)
                    .filter(|n| self.notifications.allows(n.severity));
                self.publish();
                notification
            }
            Message::NewEvent(event) => {
                debug!(event_id = %event.event_id, "Live event received");
                self.live_events.push(event.clone());
                self.caches.invalidate(SnapshotKind::RiskByUser);
                self.publish();
                None
            }
            Message::SystemStatus(_) => {
                self.caches.invalidate(SnapshotKind::PipelineStatus);
                None
            }
            Message::ConnectionEstablished(ack) => {
                info!(user_id = ?ack.user_id, "Live-update session acknowledged");
                None
            }
            _ => None,
        }
    }

    pub fn replace_alerts(&mut self, snapshot: Vec<Alert>) {
        self.alert_snapshot = snapshot;
        self.publish();
    }

    pub fn replace_events(&mut self, snapshot: Vec<EventRecord>) {
        self.event_snapshot = snapshot;
        self.publish();
    }

    pub fn replace_pipeline(&mut self, status: PipelineStatus) {
        self.pipeline = Some(status);
        self.publish();
    }

    pub fn replace_risk_by_user(&mut self, risk: Vec<UserRisk>) {
        self.risk_by_user = risk;
        self.publish();
    }

    /// Clear the one-time "is-new" flag
    pub fn mark_seen(&mut self, alert_id: &str) -> bool {
        let removed = self.new_alert_ids.remove(alert_id);
        if removed {
            self.publish();
        }
        removed
    }

    pub fn live_alerts(&self) -> &[Alert] {
        self.live_alerts.as_slice()
    }

    pub fn live_events(&self) -> &[EventRecord] {
        self.live_events.as_slice()
    }

    pub fn subscribe(&self) -> watch::Receiver<MergedState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> MergedState {
        self.state_tx.borrow().clone()
    }

    /// The "is-new" flag only lives as long as the alert stays buffered
    fn forget_evicted_flags(&mut self) {
        let live = self.live_alerts.as_slice();
        self.new_alert_ids
            .retain(|id| live.iter().any(|alert| &alert.alert_id == id));
    }

    fn publish(&self) {
        let state = MergedState {
            alerts: merged_view(self.live_alerts.as_slice(), &self.alert_snapshot),
            events: merged_view(self.live_events.as_slice(), &self.event_snapshot),
            pipeline: self.pipeline.clone(),
            risk_by_user: self.risk_by_user.clone(),
            new_alert_ids: self.new_alert_ids.clone(),
        };
        self.state_tx.send_replace(state);
    }
}

/// Shared handle: the dispatcher callback and the pollers both feed one
/// reconciler through it
#[derive(Clone)]
pub struct ReconcileHandle {
    inner: Arc<Mutex<Reconciler>>,
    notifier: Arc<dyn NotificationEmitter>,
    state_rx: watch::Receiver<MergedState>,
}

impl ReconcileHandle {
    pub fn new(reconciler: Reconciler, notifier: Arc<dyn NotificationEmitter>) -> Self {
        let state_rx = reconciler.subscribe();
        Self {
            inner: Arc::new(Mutex::new(reconciler)),
            notifier,
            state_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Reconciler> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Dispatcher entry point
    pub fn handle_message(&self, message: &Message) {
        let notification = self.lock().apply(message);
        if let Some(notification) = notification {
            self.notifier.emit(&notification);
        }
    }

    pub fn replace_alerts(&self, snapshot: Vec<Alert>) {
        self.lock().replace_alerts(snapshot);
    }

    pub fn replace_events(&self, snapshot: Vec<EventRecord>) {
        self.lock().replace_events(snapshot);
    }

    pub fn replace_pipeline(&self, status: PipelineStatus) {
        self.lock().replace_pipeline(status);
    }

    pub fn replace_risk_by_user(&self, risk: Vec<UserRisk>) {
        self.lock().replace_risk_by_user(risk);
    }

    pub fn mark_seen(&self, alert_id: &str) -> bool {
        self.lock().mark_seen(alert_id)
    }

    pub fn live_alerts(&self) -> Vec<Alert> {
        self.lock().live_alerts().to_vec()
    }

    pub fn live_events(&self) -> Vec<EventRecord> {
        self.lock().live_events().to_vec()
    }

    pub fn state(&self) -> MergedState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that changes on every recomputation
    pub fn watch(&self) -> watch::Receiver<MergedState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Notification>>,
    }

    impl NotificationEmitter for Recorder {
        fn emit(&self, notification: &Notification) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(notification.clone());
            }
        }
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.seen.lock().map(|s| s.len()).unwrap_or(0)
        }
    }

    fn setup(capacity: usize) -> (ReconcileHandle, Arc<Recorder>, Arc<SnapshotCaches>) {
        let caches = Arc::new(SnapshotCaches::default());
        let recorder = Arc::new(Recorder::default());
        let reconciler = Reconciler::new(capacity, caches.clone(), NotificationConfig::default());
        let handle = ReconcileHandle::new(reconciler, recorder.clone());
        (handle, recorder, caches)
    }

    fn alert(id: &str, minute: u32, priority: &str) -> Alert {
        serde_json::from_value(json!({
            "alert_id": id,
            "created_at": format!("2024-05-01T10:{:02}:00Z", minute),
            "priority": priority,
            "summary": format!("alert {}", id),
        }))
        .unwrap()
    }

    fn new_alert(id: &str, minute: u32, priority: &str) -> Message {
        Message::NewAlert {
            alert: alert(id, minute, priority),
        }
    }

    fn event(id: &str, minute: u32) -> EventRecord {
        serde_json::from_value(json!({
            "event_id": id,
            "user_id": "u-1",
            "action": "download",
            "document_name": "plan.pdf",
            "risk_score": 0.4,
            "risk_level": "medium",
            "timestamp": format!("2024-05-01T10:{:02}:00Z", minute),
        }))
        .unwrap()
    }

    #[test]
    fn test_alert_buffer_keeps_latest_capacity() {
        let (handle, _, _) = setup(10);
        for i in 0..15 {
            handle.handle_message(&new_alert(&format!("a-{}", i), i, "low"));
        }

        let live = handle.live_alerts();
        assert_eq!(live.len(), 10);
        assert_eq!(live[0].alert_id, "a-14");
        assert_eq!(live[9].alert_id, "a-5");
    }

    #[test]
    fn test_merged_alerts_prefer_live_copy() {
        let (handle, _, _) = setup(10);
        let mut stale = alert("a-1", 1, "low");
        stale.summary = "stale".to_string();
        handle.replace_alerts(vec![stale, alert("a-0", 0, "low")]);

        handle.handle_message(&new_alert("a-1", 1, "low"));
        handle.handle_message(&new_alert("a-2", 2, "low"));

        let state = handle.state();
        let ids: Vec<&str> = state.alerts.iter().map(|a| a.alert_id.as_str()).collect();
        assert_eq!(ids, vec!["a-2", "a-1", "a-0"]);
        assert_eq!(state.alerts[1].summary, "alert a-1");
    }

    #[test]
    fn test_critical_notifies_once_low_never() {
        let (handle, recorder, _) = setup(10);

        handle.handle_message(&new_alert("a-1", 1, "critical"));
        assert_eq!(recorder.count(), 1);

        handle.handle_message(&new_alert("a-2", 2, "low"));
        handle.handle_message(&Message::NewEvent(event("e-1", 3)));
        assert_eq!(recorder.count(), 1);

        handle.handle_message(&new_alert("a-3", 4, "high"));
        assert_eq!(recorder.count(), 2);
    }

    #[test]
    fn test_invalidation_per_message_type() {
        let (handle, _, caches) = setup(10);

        handle.handle_message(&new_alert("a-1", 1, "low"));
        assert_eq!(caches.generation(SnapshotKind::Alerts), 1);
        assert_eq!(caches.generation(SnapshotKind::RiskByUser), 0);

        handle.handle_message(&Message::NewEvent(event("e-1", 1)));
        assert_eq!(caches.generation(SnapshotKind::RiskByUser), 1);
        assert_eq!(caches.generation(SnapshotKind::Events), 0);

        let status: Message =
            Message::from_json(r#"{"type":"system_status","pipeline":"running"}"#).unwrap();
        let before = handle.state();
        handle.handle_message(&status);
        assert_eq!(caches.generation(SnapshotKind::PipelineStatus), 1);
        assert_eq!(handle.state(), before);
    }

    #[test]
    fn test_new_flag_cleared_once() {
        let (handle, _, _) = setup(10);
        handle.handle_message(&new_alert("a-1", 1, "medium"));
        assert!(handle.state().is_new("a-1"));

        assert!(handle.mark_seen("a-1"));
        assert!(!handle.state().is_new("a-1"));
        assert!(!handle.mark_seen("a-1"));
    }

    #[test]
    fn test_new_flags_follow_buffer_eviction() {
        let (handle, _, _) = setup(10);
        for i in 0..1000u32 {
            let mut live = alert(&format!("a-{}", i), 0, "low");
            live.created_at += chrono::Duration::seconds(i64::from(i));
            handle.handle_message(&Message::NewAlert { alert: live });
        }

        let state = handle.state();
        assert_eq!(state.new_alert_ids.len(), 10);
        assert!(state.is_new("a-999"));
        assert!(state.is_new("a-990"));
        assert!(!state.is_new("a-989"));
        assert!(!handle.mark_seen("a-0"));
    }

    #[test]
    fn test_events_merge_with_snapshot() {
        let (handle, _, _) = setup(10);
        handle.replace_events(vec![event("e-1", 1), event("e-3", 3)]);
        handle.handle_message(&Message::NewEvent(event("e-2", 2)));
        handle.handle_message(&Message::NewEvent(event("e-3", 3)));

        let ids: Vec<String> = handle
            .state()
            .events
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["e-3", "e-2", "e-1"]);
    }
}
