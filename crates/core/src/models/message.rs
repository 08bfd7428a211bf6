//! Live-update wire messages, discriminated by the `type` field

use super::alert::Alert;
use super::event::EventRecord;
use super::status::SystemStatus;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Channel name announcing interest in everything
pub const ALL_CHANNELS: &str = "all";

/// A live-update message in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // server -> client
    ConnectionEstablished(ConnectionAck),
    NewEvent(EventRecord),
    NewAlert { alert: Alert },
    SystemStatus(SystemStatus),
    Pong {
        #[serde(default)]
        timestamp: Option<String>,
    },
    Subscribed {
        #[serde(default)]
        channels: Vec<String>,
    },

    // client -> server
    Ping { timestamp: String },
    Subscribe { channels: Vec<String> },
}

impl Message {
    /// Keep-alive ping stamped with the current time
    pub fn ping() -> Self {
        Message::Ping {
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Subscription to every channel, sent once per successful open
    pub fn subscribe_all() -> Self {
        Message::Subscribe {
            channels: vec![ALL_CHANNELS.to_string()],
        }
    }

    /// Wire name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ConnectionEstablished(_) => "connection_established",
            Message::NewEvent(_) => "new_event",
            Message::NewAlert { .. } => "new_alert",
            Message::SystemStatus(_) => "system_status",
            Message::Pong { .. } => "pong",
            Message::Subscribed { .. } => "subscribed",
            Message::Ping { .. } => "ping",
            Message::Subscribe { .. } => "subscribe",
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Server acknowledgement sent right after the socket is accepted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionAck {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
