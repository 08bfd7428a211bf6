//! One mounted live-update session
//!
//! Owns the Connection Manager, the reconciler, and the snapshot pollers.
//! Everything is built on `mount` and torn down on `unmount` (or drop); no
//! state outlives the session.

use crate::notify::{NotificationConfig, NotificationEmitter, TracingNotifier};
use crate::poller::{
    spawn_poller, AlertsFetcher, EventsFetcher, PipelineFetcher, PollerHandle, PollerStatus,
    RiskByUserFetcher,
};
use crate::reconcile::{MergedState, ReconcileHandle, Reconciler};
use std::sync::Arc;
use threatfeed_core::{ClientConfig, ConnectionStatus, Result};
use threatfeed_networking::websocket::Transport;
use threatfeed_networking::{ConnectionManager, ThreatApiClient, TungsteniteTransport};
use threatfeed_persistence::SnapshotCaches;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Collaborators a session is mounted with
pub struct SessionDeps {
    /// Bearer token for both the socket and the REST snapshots
    pub credential: Option<String>,
    pub transport: Arc<dyn Transport>,
    pub notifier: Arc<dyn NotificationEmitter>,
    pub notifications: NotificationConfig,
}

impl SessionDeps {
    /// Production wiring: tungstenite transport, log-line notifications
    pub fn new(credential: Option<String>) -> Self {
        Self {
            credential,
            transport: Arc::new(TungsteniteTransport),
            notifier: Arc::new(TracingNotifier),
            notifications: NotificationConfig::default(),
        }
    }
}

pub struct LiveSession {
    connection: ConnectionManager,
    reconciler: ReconcileHandle,
    caches: Arc<SnapshotCaches>,
    pollers: Vec<PollerHandle>,
    cancel_token: CancellationToken,
}

impl LiveSession {
    /// Build everything, start the pollers, and connect.
    /// Must be called inside a Tokio runtime.
    pub fn mount(config: &ClientConfig, deps: SessionDeps) -> Result<Self> {
        config.validate()?;

        let caches = Arc::new(SnapshotCaches::with_ttls(
            config.alerts_poll_interval,
            config.events_poll_interval,
            config.pipeline_poll_interval,
            config.risk_poll_interval,
        ));

        let reconciler = ReconcileHandle::new(
            Reconciler::new(config.live_buffer_capacity, caches.clone(), deps.notifications),
            deps.notifier,
        );

        let connection = ConnectionManager::new(config, deps.credential, deps.transport);

        let subscriber = reconciler.clone();
        connection.subscribe(move |message| subscriber.handle_message(message));

        let cancel_token = CancellationToken::new();
        let pollers = match connection.credential() {
            Some(token) => {
                let api = ThreatApiClient::new(&config.api_base, token)?;
                spawn_pollers(config, &api, &caches, &reconciler, &cancel_token)
            }
            None => {
                warn!("No bearer credential, snapshot polling disabled");
                Vec::new()
            }
        };

        connection.connect();
        info!(
            endpoint = %config.ws_endpoint,
            pollers = pollers.len(),
            "Live session mounted"
        );

        Ok(Self {
            connection,
            reconciler,
            caches,
            pollers,
            cancel_token,
        })
    }

    /// Tear down and wait for every background task to exit
    pub async fn unmount(mut self) {
        self.teardown();
        self.connection.shutdown().await;
        for poller in self.pollers.drain(..) {
            poller.stop().await;
        }
        info!("Live session unmounted");
    }

    /// No reconnect, no keep-alive, socket closed, polling stopped.
    /// All of it happens before this returns.
    fn teardown(&mut self) {
        self.connection.disconnect();
        self.cancel_token.cancel();
        self.connection.dispatcher().unsubscribe();
    }

    pub fn state(&self) -> MergedState {
        self.reconciler.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<MergedState> {
        self.reconciler.watch()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn reconciler(&self) -> &ReconcileHandle {
        &self.reconciler
    }

    pub fn caches(&self) -> &Arc<SnapshotCaches> {
        &self.caches
    }

    pub fn mark_seen(&self, alert_id: &str) -> bool {
        self.reconciler.mark_seen(alert_id)
    }

    pub async fn poller_statuses(&self) -> Vec<PollerStatus> {
        let mut statuses = Vec::with_capacity(self.pollers.len());
        for poller in &self.pollers {
            statuses.push(poller.status().await);
        }
        statuses
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn spawn_pollers(
    config: &ClientConfig,
    api: &ThreatApiClient,
    caches: &SnapshotCaches,
    reconciler: &ReconcileHandle,
    cancel_token: &CancellationToken,
) -> Vec<PollerHandle> {
    let alerts = {
        let r = reconciler.clone();
        spawn_poller(
            AlertsFetcher {
                client: api.clone(),
                page_size: config.alerts_page_size,
            },
            caches.alerts.clone(),
            config.alerts_poll_interval,
            move |snapshot| r.replace_alerts(snapshot),
            cancel_token.child_token(),
        )
    };

    let events = {
        let r = reconciler.clone();
        spawn_poller(
            EventsFetcher {
                client: api.clone(),
                limit: config.events_limit,
            },
            caches.events.clone(),
            config.events_poll_interval,
            move |snapshot| r.replace_events(snapshot),
            cancel_token.child_token(),
        )
    };

    let pipeline = {
        let r = reconciler.clone();
        spawn_poller(
            PipelineFetcher {
                client: api.clone(),
            },
            caches.pipeline.clone(),
            config.pipeline_poll_interval,
            move |status| r.replace_pipeline(status),
            cancel_token.child_token(),
        )
    };

    let risk = {
        let r = reconciler.clone();
        spawn_poller(
            RiskByUserFetcher {
                client: api.clone(),
                limit: config.risk_user_limit,
            },
            caches.risk_by_user.clone(),
            config.risk_poll_interval,
            move |risk| r.replace_risk_by_user(risk),
            cancel_token.child_token(),
        )
    };

    vec![alerts, events, pipeline, risk]
}
