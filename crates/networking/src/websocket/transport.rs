//! Socket abstraction over the live-update transport
//!
//! The Connection Manager only sees `Transport`/`Socket`; production uses
//! tokio-tungstenite, tests use the scripted transport in `mock`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use threatfeed_core::{Error, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};
use tracing::{info, trace};
use url::Url;

/// Inbound frame as seen by the dispatcher loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Close frame, with the peer's reason if any
    Close(Option<String>),
    /// Binary, ping/pong, and other control frames
    Other,
}

/// One open live-update connection
#[async_trait]
pub trait Socket: Send {
    /// Next inbound frame; `None` once the stream has ended.
    /// Must be cancel-safe: it is raced against timers and outbound sends.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens sockets to the live-update endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn Socket>>;
}

/// tokio-tungstenite transport (ws:// and wss://)
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn Socket>> {
        let (ws, response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::ConnectionError(e.to_string()))?;

        // The query string carries the bearer token, so only host/path are logged
        info!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            status = ?response.status(),
            "Live-update socket connected"
        );

        Ok(Box::new(TungsteniteSocket { ws }))
    }
}

struct TungsteniteSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Socket for TungsteniteSocket {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        let msg = match self.ws.next().await? {
            Ok(msg) => msg,
            Err(e) => return Some(Err(Error::ConnectionError(e.to_string()))),
        };

        let frame = match msg {
            WsMessage::Text(text) => Frame::Text(text),
            WsMessage::Close(frame) => Frame::Close(frame.map(|f| f.reason.to_string())),
            WsMessage::Ping(data) => {
                trace!("Received WS ping, sending pong");
                if let Err(e) = self.ws.send(WsMessage::Pong(data)).await {
                    return Some(Err(Error::ConnectionError(e.to_string())));
                }
                Frame::Other
            }
            _ => Frame::Other,
        };
        Some(Ok(frame))
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.ws
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| Error::ConnectionError(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.ws
            .close(None)
            .await
            .map_err(|e| Error::ConnectionError(e.to_string()))
    }
}
