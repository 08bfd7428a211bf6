//! Reconnecting live-update Connection Manager
//!
//! One driver task per `connect()`. Every state change made by a driver is
//! published under the control lock and only if that driver's token is still
//! live, so once `disconnect()` returns no stale timer or socket can move the
//! state again.

use super::dispatcher::MessageDispatcher;
use super::keepalive::KeepAlive;
use super::transport::{Frame, Socket, Transport};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use threatfeed_core::{
    ClientConfig, ConnectionFailure, ConnectionState, ConnectionStatus, Error, Message, Result,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

const OUTBOUND_CAPACITY: usize = 32;
const TRANSITION_CAPACITY: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the live-update connection for one session.
///
/// Dropping the manager is equivalent to `disconnect()`.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: String,
    credential: Option<String>,
    reconnect_delay: Duration,
    max_attempts: u32,
    ping_interval: Duration,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<MessageDispatcher>,
    status: watch::Sender<ConnectionStatus>,
    transitions: broadcast::Sender<ConnectionStatus>,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    /// Token of the current driver; `None` once disconnected
    cancel: Option<CancellationToken>,
    /// Outbound queue of the currently open socket
    outbound: Option<mpsc::Sender<String>>,
    tasks: Vec<JoinHandle<()>>,
}

enum SocketEnd {
    Cancelled,
    Lost(String),
}

impl ConnectionManager {
    /// `credential` is the bearer token; `None` or blank means
    /// `connect()` fails fast with `ConnectionFailure::MissingCredential`.
    pub fn new(
        config: &ClientConfig,
        credential: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::idle());
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                endpoint: config.ws_endpoint.clone(),
                credential: credential.filter(|c| !c.trim().is_empty()),
                reconnect_delay: config.reconnect_delay,
                max_attempts: config.max_reconnect_attempts,
                ping_interval: config.ping_interval,
                transport,
                dispatcher: Arc::new(MessageDispatcher::new(config.message_log_capacity)),
                status,
                transitions,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Start connecting. No-op while a driver is already active
    /// (Connecting, Open, Reconnecting). Must be called inside a Tokio runtime.
    pub fn connect(&self) {
        let inner = &self.inner;
        let mut control = inner.control();

        let current = inner.status.borrow().clone();
        if current.state.is_active() {
            debug!(state = ?current.state, "connect() ignored, connection already active");
            return;
        }

        let Some(credential) = inner.credential.clone() else {
            error!("No bearer credential available, live updates disabled");
            inner.publish(ConnectionStatus {
                state: ConnectionState::Closed,
                attempts: 0,
                failure: Some(ConnectionFailure::MissingCredential),
            });
            return;
        };

        if let Some(stale) = control.cancel.take() {
            stale.cancel();
        }
        let cancel = CancellationToken::new();
        control.cancel = Some(cancel.clone());

        inner.publish(ConnectionStatus {
            state: ConnectionState::Connecting,
            attempts: 0,
            failure: None,
        });

        control.tasks.retain(|task| !task.is_finished());
        control
            .tasks
            .push(tokio::spawn(drive(inner.clone(), cancel, credential)));
    }

    /// Stop for good: cancels any pending reconnect, stops the keep-alive,
    /// and closes the socket. Idempotent.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        let mut control = inner.control();

        let had_driver = match control.cancel.take() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        };
        control.outbound = None;

        let current = inner.status.borrow().clone();
        if current.state != ConnectionState::Closed {
            info!(state = ?current.state, "Disconnecting live-update connection");
            inner.publish(ConnectionStatus {
                state: ConnectionState::Closed,
                attempts: current.attempts,
                failure: None,
            });
        } else if had_driver {
            debug!("disconnect() after driver already finished");
        }
    }

    /// `disconnect()` and wait for the driver tasks to finish closing
    pub async fn shutdown(&self) {
        self.disconnect();
        let tasks = std::mem::take(&mut self.inner.control().tasks);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Connection driver ended abnormally");
            }
        }
    }

    /// Queue a message on the open socket. Returns false (nothing queued)
    /// unless the connection is Open.
    pub fn send(&self, message: &Message) -> bool {
        if !self.state().is_open() {
            debug!(kind = message.kind(), "send() while not open, dropped");
            return false;
        }

        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound message");
                return false;
            }
        };

        let control = self.inner.control();
        match control.outbound.as_ref() {
            Some(tx) => tx.try_send(json).is_ok(),
            None => false,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.borrow().state
    }

    /// Latest-value view of the status
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Every transition, in order
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.inner.transitions.subscribe()
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.inner.dispatcher
    }

    /// Shorthand for `dispatcher().subscribe(..)`
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(callback);
    }

    pub fn max_attempts(&self) -> u32 {
        self.inner.max_attempts
    }

    pub fn has_credential(&self) -> bool {
        self.inner.credential.is_some()
    }

    /// The bearer token, if a non-blank one was supplied
    pub fn credential(&self) -> Option<&str> {
        self.inner.credential.as_deref()
    }

    /// Status indicator text, e.g. "Reconnecting (2/5)"
    pub fn status_label(&self) -> String {
        self.status().label(self.inner.max_attempts)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Caller holds the control lock
    fn publish(&self, status: ConnectionStatus) {
        self.status.send_replace(status.clone());
        let _ = self.transitions.send(status);
    }

    /// Driver-side transition; dropped if the driver has been cancelled
    fn transition(&self, cancel: &CancellationToken, status: ConnectionStatus) -> bool {
        let _control = self.control();
        if cancel.is_cancelled() {
            return false;
        }
        self.publish(status);
        true
    }

    fn mark_open(&self, cancel: &CancellationToken, outbound: mpsc::Sender<String>) -> bool {
        let mut control = self.control();
        if cancel.is_cancelled() {
            return false;
        }
        control.outbound = Some(outbound);
        self.publish(ConnectionStatus {
            state: ConnectionState::Open,
            attempts: 0,
            failure: None,
        });
        true
    }

    fn clear_outbound(&self, cancel: &CancellationToken) {
        let mut control = self.control();
        if !cancel.is_cancelled() {
            control.outbound = None;
        }
    }

    /// Endpoint with the credential attached as the `token` query parameter
    fn endpoint_url(&self, credential: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::ConnectionError(format!(
                    "Unsupported live-update scheme '{}'",
                    other
                )))
            }
        }
        url.query_pairs_mut().append_pair("token", credential);
        Ok(url)
    }

    async fn open(&self, credential: &str) -> Result<Box<dyn Socket>> {
        let url = self.endpoint_url(credential)?;
        self.transport.open(&url).await
    }

    /// Pump one open socket until it is lost or the driver is cancelled
    async fn run_open(
        &self,
        mut socket: Box<dyn Socket>,
        mut outbound: mpsc::Receiver<String>,
        cancel: &CancellationToken,
    ) -> SocketEnd {
        match Message::subscribe_all().to_json() {
            Ok(json) => {
                if let Err(e) = socket.send_text(json).await {
                    return SocketEnd::Lost(e.to_string());
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode subscribe message"),
        }

        let mut keepalive = KeepAlive::start(self.ping_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    close_quietly(socket).await;
                    return SocketEnd::Cancelled;
                }

                frame = socket.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        self.dispatcher.dispatch(&text);
                    }
                    Some(Ok(Frame::Other)) => {}
                    Some(Ok(Frame::Close(reason))) => {
                        return SocketEnd::Lost(
                            reason.unwrap_or_else(|| "closed by server".to_string()),
                        );
                    }
                    Some(Err(e)) => return SocketEnd::Lost(e.to_string()),
                    None => return SocketEnd::Lost("stream ended".to_string()),
                },

                Some(text) = outbound.recv() => {
                    if let Err(e) = socket.send_text(text).await {
                        return SocketEnd::Lost(e.to_string());
                    }
                }

                ping = keepalive.tick() => {
                    let json = match ping.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode keep-alive ping");
                            continue;
                        }
                    };
                    if let Err(e) = socket.send_text(json).await {
                        return SocketEnd::Lost(e.to_string());
                    }
                    debug!("Keep-alive ping sent");
                }
            }
        }
    }
}

async fn close_quietly(mut socket: Box<dyn Socket>) {
    match tokio::time::timeout(CLOSE_TIMEOUT, socket.close()).await {
        Ok(Ok(())) => debug!("Live-update socket closed"),
        Ok(Err(e)) => debug!(error = %e, "Error closing live-update socket"),
        Err(_) => debug!("Timed out closing live-update socket"),
    }
}

/// Connection driver: open, pump, and on loss schedule a fixed-delay
/// reconnect until the attempt ceiling is reached.
async fn drive(inner: Arc<Inner>, cancel: CancellationToken, credential: String) {
    let mut attempts: u32 = 0;

    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = inner.open(&credential) => opened,
        };

        let reason = match opened {
            Ok(socket) => {
                attempts = 0;
                let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
                if !inner.mark_open(&cancel, tx) {
                    close_quietly(socket).await;
                    return;
                }
                info!("Live-update connection open");

                match inner.run_open(socket, rx, &cancel).await {
                    SocketEnd::Cancelled => return,
                    SocketEnd::Lost(reason) => {
                        inner.clear_outbound(&cancel);
                        warn!(reason = %reason, "Live-update connection lost");
                        reason
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, attempt = attempts, "Live-update connection failed");
                e.to_string()
            }
        };

        if attempts >= inner.max_attempts {
            error!(attempts, "Reconnect ceiling reached, live updates stopped");
            inner.transition(
                &cancel,
                ConnectionStatus {
                    state: ConnectionState::Closed,
                    attempts,
                    failure: Some(ConnectionFailure::RetriesExhausted { attempts }),
                },
            );
            return;
        }

        attempts += 1;
        let failure = Some(ConnectionFailure::Transport { message: reason });
        if !inner.transition(
            &cancel,
            ConnectionStatus {
                state: ConnectionState::Reconnecting,
                attempts,
                failure: failure.clone(),
            },
        ) {
            return;
        }
        info!(
            attempt = attempts,
            max = inner.max_attempts,
            delay_ms = inner.reconnect_delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(inner.reconnect_delay) => {}
        }

        if !inner.transition(
            &cancel,
            ConnectionStatus {
                state: ConnectionState::Connecting,
                attempts,
                failure,
            },
        ) {
            return;
        }
    }
}
