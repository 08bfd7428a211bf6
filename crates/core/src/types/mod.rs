//! Shared type definitions: connection status, severities, and the
//! identity/ordering contract used by the merged views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Live-update connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// A driver is alive in these states (connect() is a no-op)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Reconnecting
        )
    }
}

/// Why the connection is (or was last) unhealthy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConnectionFailure {
    /// Configuration failure: no reconnect is ever scheduled
    MissingCredential,
    /// Reconnect ceiling reached
    RetriesExhausted { attempts: u32 },
    /// Latest transient error, informational while reconnecting
    Transport { message: String },
}

/// Observable status of the Connection Manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open
    pub attempts: u32,
    pub failure: Option<ConnectionFailure>,
}

impl ConnectionStatus {
    pub fn idle() -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            failure: None,
        }
    }

    /// True for the two terminal failure conditions
    pub fn is_failed(&self) -> bool {
        matches!(
            self.failure,
            Some(ConnectionFailure::MissingCredential)
                | Some(ConnectionFailure::RetriesExhausted { .. })
        )
    }

    /// Status indicator text
    pub fn label(&self, max_attempts: u32) -> String {
        match (&self.state, &self.failure) {
            (_, Some(ConnectionFailure::MissingCredential)) => "Missing credential".to_string(),
            (_, Some(ConnectionFailure::RetriesExhausted { attempts })) => {
                format!("Failed after {} attempts", attempts)
            }
            (ConnectionState::Idle, _) => "Idle".to_string(),
            (ConnectionState::Connecting, _) => "Connecting".to_string(),
            (ConnectionState::Open, _) => "Open".to_string(),
            (ConnectionState::Reconnecting, _) => {
                format!("Reconnecting ({}/{})", self.attempts, max_attempts)
            }
            (ConnectionState::Closed, _) => "Closed".to_string(),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Alert severity / priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Severity {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }

    /// Severities that raise a user notification on live arrival
    pub fn is_notifiable(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }

    /// Case-insensitive parse; unrecognized values map to `Unknown`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| Severity::parse(&s)).unwrap_or_default())
    }
}

/// Snapshot kinds refreshed by REST polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Alerts,
    Events,
    PipelineStatus,
    RiskByUser,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Alerts => "alerts",
            SnapshotKind::Events => "events",
            SnapshotKind::PipelineStatus => "pipeline_status",
            SnapshotKind::RiskByUser => "risk_by_user",
        }
    }
}

/// Items that can appear in a merged view: keyed by a server-assigned id,
/// ordered by creation time
pub trait Reconcilable: Clone {
    fn id(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_case_insensitive() {
        assert_eq!(Severity::parse("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse("high"), Severity::High);
        assert_eq!(Severity::parse(" Medium "), Severity::Medium);
        assert_eq!(Severity::parse("severe"), Severity::Unknown);
    }

    #[test]
    fn test_severity_deserialize_null() {
        let sev: Severity = serde_json::from_str("null").unwrap();
        assert_eq!(sev, Severity::Unknown);
        let sev: Severity = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(sev, Severity::Low);
    }

    #[test]
    fn test_status_labels() {
        let mut status = ConnectionStatus::idle();
        assert_eq!(status.label(5), "Idle");

        status.state = ConnectionState::Reconnecting;
        status.attempts = 2;
        assert_eq!(status.label(5), "Reconnecting (2/5)");

        status.state = ConnectionState::Closed;
        status.failure = Some(ConnectionFailure::RetriesExhausted { attempts: 5 });
        assert_eq!(status.label(5), "Failed after 5 attempts");
        assert!(status.is_failed());

        status.failure = Some(ConnectionFailure::Transport {
            message: "refused".into(),
        });
        assert_eq!(status.label(5), "Closed");
        assert!(!status.is_failed());
    }

    #[test]
    fn test_active_states() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Reconnecting.is_active());
        assert!(!ConnectionState::Closed.is_active());
        assert!(!ConnectionState::Idle.is_active());
    }
}
