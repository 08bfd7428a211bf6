//! Alert models (pushed via `new_alert`, polled via the alerts list)

use super::lenient::{
    deserialize_f64_lenient, deserialize_string_or_number, deserialize_timestamp,
    deserialize_timestamp_opt,
};
use crate::types::{Reconcilable, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A security alert raised by the server-side pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_department: Option<String>,

    #[serde(default)]
    pub priority: Severity,
    /// Alias of `priority` on newer servers
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub risk_score: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub explanation: Option<serde_json::Value>,

    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub resolution_notes: Option<String>,

    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp_opt")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// `severity` if the server set it, else `priority`
    pub fn effective_severity(&self) -> Severity {
        if self.severity != Severity::Unknown {
            self.severity
        } else {
            self.priority
        }
    }
}

impl Reconcilable for Alert {
    fn id(&self) -> &str {
        &self.alert_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Response from GET /alerts/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertListResponse {
    pub alerts: Vec<Alert>,
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub total: u32,
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub page: u32,
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub page_size: u32,
    #[serde(default)]
    pub stats: AlertStats,
}

/// Aggregate counters returned with the alerts list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub open: u64,
    #[serde(default)]
    pub investigating: u64,
    #[serde(default)]
    pub resolved: u64,
    #[serde(default)]
    pub by_priority: HashMap<String, u64>,
}
