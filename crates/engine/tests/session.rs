use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threatfeed_core::{ClientConfig, ConnectionFailure, ConnectionState};
use threatfeed_engine::{LiveSession, Notification, NotificationConfig, NotificationEmitter, SessionDeps};
use threatfeed_networking::websocket::mock::{mock_pair, Outcome, ScriptedTransport};
use threatfeed_networking::websocket::Transport;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Notification>>,
}

impl NotificationEmitter for Recorder {
    fn emit(&self, notification: &Notification) {
        self.seen.lock().unwrap().push(notification.clone());
    }
}

impl Recorder {
    fn alert_ids(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.alert_id.clone())
            .collect()
    }
}

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alerts": [
                {"alert_id": "a-1", "created_at": "2024-05-01T10:01:00Z", "priority": "medium", "summary": "stale copy"},
                {"alert_id": "a-0", "created_at": "2024-05-01T10:00:00Z", "priority": "low", "summary": "old"}
            ],
            "total": 2,
            "page": 1,
            "page_size": 50,
            "stats": {"total": 2, "open": 2}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/events/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "event_id": "e-1",
                "user_id": "u-1",
                "action": "download",
                "document_name": "plan.pdf",
                "risk_score": 0.8,
                "risk_level": "high",
                "timestamp": "2024-05-01T10:00:00Z"
            }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/ml/top-risk-users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [
                {"user_id": 1, "username": "jdoe", "department": "FINANCE",
                 "risk_score": 0.8, "avg_risk_score": 0.8, "anomaly_count": 1, "event_count": 1}
            ],
            "total_users": 1,
            "period": "24h"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/ml/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    server
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        api_base: format!("{}/api", server.uri()),
        reconnect_delay: Duration::from_millis(50),
        ..ClientConfig::default()
    }
}

fn deps(
    credential: Option<&str>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn NotificationEmitter>,
) -> SessionDeps {
    SessionDeps {
        credential: credential.map(str::to_string),
        transport,
        notifier,
        notifications: NotificationConfig::default(),
    }
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_live_alerts_merge_with_polled_snapshot() {
    let server = mock_server().await;
    let (socket, peer) = mock_pair();
    let transport = Arc::new(ScriptedTransport::new([Outcome::Accept(socket)]));
    let recorder = Arc::new(Recorder::default());

    let session = LiveSession::mount(
        &config(&server),
        deps(Some("tok"), transport.clone(), recorder.clone()),
    )
    .unwrap();

    wait_until("open and first snapshots", || {
        let state = session.state();
        session.connection_status().state == ConnectionState::Open
            && state.alerts.len() == 2
            && state.events.len() == 1
    })
    .await;

    peer.push_text(
        r#"{"type":"new_alert","alert":{"alert_id":"a-1","created_at":"2024-05-01T10:01:00Z","priority":"critical","summary":"live copy"}}"#,
    );
    peer.push_text(
        r#"{"type":"new_alert","alert":{"alert_id":"a-2","created_at":"2024-05-01T10:02:00Z","priority":"low","summary":"fresh"}}"#,
    );
    peer.push_text("definitely not json");

    wait_until("live alerts merged", || session.state().alerts.len() == 3).await;

    let state = session.state();
    let ids: Vec<&str> = state.alerts.iter().map(|a| a.alert_id.as_str()).collect();
    assert_eq!(ids, vec!["a-2", "a-1", "a-0"]);
    assert_eq!(state.alerts[1].summary, "live copy");
    assert!(state.is_new("a-1"));
    assert!(state.is_new("a-2"));
    assert!(!state.is_new("a-0"));

    assert_eq!(recorder.alert_ids(), vec!["a-1".to_string()]);
    assert_eq!(session.connection_status().state, ConnectionState::Open);
    assert_eq!(session.connection().dispatcher().malformed_count(), 1);

    assert!(session.mark_seen("a-1"));
    assert!(!session.state().is_new("a-1"));

    wait_until("risk view", || !session.state().risk_by_user.is_empty()).await;
    let risk = session.state().risk_by_user;
    assert_eq!(risk[0].user_id, "1");
    assert_eq!(risk[0].username.as_deref(), Some("jdoe"));

    // subscribe frame went out first
    assert_eq!(peer.sent()[0], r#"{"type":"subscribe","channels":["all"]}"#);

    session.unmount().await;
    assert!(peer.was_closed());
}

#[tokio::test]
async fn test_unmount_stops_reconnects_and_polling() {
    let server = mock_server().await;
    let transport = Arc::new(ScriptedTransport::default());
    let recorder = Arc::new(Recorder::default());

    let session = LiveSession::mount(
        &config(&server),
        deps(Some("tok"), transport.clone(), recorder),
    )
    .unwrap();

    wait_until("first reconnect scheduled", || {
        session.connection_status().state == ConnectionState::Reconnecting
    })
    .await;

    let status = session.connection_status();
    assert!(status.attempts >= 1);
    assert!(status.attempts <= 5);

    session.unmount().await;

    let opens = transport.open_count();
    let requests = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(transport.open_count(), opens);
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
}

#[tokio::test]
async fn test_missing_credential_is_fatal() {
    let server = mock_server().await;
    let transport = Arc::new(ScriptedTransport::default());
    let recorder = Arc::new(Recorder::default());

    let session = LiveSession::mount(&config(&server), deps(None, transport.clone(), recorder))
        .unwrap();

    let status = session.connection_status();
    assert_eq!(status.state, ConnectionState::Closed);
    assert_eq!(status.failure, Some(ConnectionFailure::MissingCredential));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.open_count(), 0);
    assert!(session.poller_statuses().await.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());

    session.unmount().await;
}

#[tokio::test]
async fn test_dropping_session_tears_down() {
    let server = mock_server().await;
    let (socket, peer) = mock_pair();
    let transport = Arc::new(ScriptedTransport::new([Outcome::Accept(socket)]));
    let recorder = Arc::new(Recorder::default());

    let session = LiveSession::mount(
        &config(&server),
        deps(Some("tok"), transport.clone(), recorder),
    )
    .unwrap();
    wait_until("open", || {
        session.connection_status().state == ConnectionState::Open
    })
    .await;

    drop(session);
    wait_until("socket closed", || peer.was_closed()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.open_count(), 1);
}
