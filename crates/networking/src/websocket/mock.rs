//! Scripted in-memory transport for connection tests

use super::transport::{Frame, Socket, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use threatfeed_core::{Error, Result};
use tokio::sync::mpsc;
use url::Url;

/// What the next `open()` call does
pub enum Outcome {
    Refuse(String),
    Accept(MockSocket),
}

/// Transport that plays back a fixed script of open outcomes.
/// Once the script runs out every open is refused.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    opens: AtomicUsize,
    urls: Mutex<Vec<Url>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            opens: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: Outcome) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    /// Number of times `open()` was called
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn opened_urls(&self) -> Vec<Url> {
        self.urls.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn Socket>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.clone());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Outcome::Accept(socket)) => Ok(Box::new(socket)),
            Some(Outcome::Refuse(reason)) => Err(Error::ConnectionError(reason)),
            None => Err(Error::ConnectionError("connection refused".to_string())),
        }
    }
}

/// Client half of an in-memory socket
pub struct MockSocket {
    inbound: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// Server half: push frames in, inspect what the client sent
pub struct MockPeer {
    inbound: mpsc::UnboundedSender<Frame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

pub fn mock_pair() -> (MockSocket, MockPeer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockSocket {
            inbound: rx,
            sent: sent.clone(),
            closed: closed.clone(),
        },
        MockPeer {
            inbound: tx,
            sent,
            closed,
        },
    )
}

impl MockPeer {
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Frame::Text(text.into()));
    }

    /// Server-initiated close frame
    pub fn close(&self) {
        let _ = self.inbound.send(Frame::Close(Some("server closed".to_string())));
    }

    /// Raw frames the client has sent, in order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Whether the client closed its side
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Socket for MockSocket {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionError("socket closed".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
