//! Document-action event models (pushed via `new_event`, polled via /events/all)

use super::lenient::{deserialize_f64_lenient, deserialize_id_string, deserialize_timestamp};
use crate::types::{Reconcilable, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A processed document-action event.
///
/// The live payload carries only the leading fields; the REST detail adds the
/// optional ones. Both sources deserialize into this one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub document_name: String,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub risk_score: f64,
    #[serde(default)]
    pub risk_level: Severity,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub is_anomalous: bool,
    #[serde(default)]
    pub is_cross_department: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_factors: Vec<String>,
}

impl Reconcilable for EventRecord {
    fn id(&self) -> &str {
        &self.event_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// One row of the top-risk-users view (GET /ml/top-risk-users)
///
/// The server aggregates over its own trailing window; `risk_score` is the
/// user's peak score in that window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRisk {
    #[serde(deserialize_with = "deserialize_id_string")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub risk_score: f64,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub avg_risk_score: f64,
    /// Events at or above the anomaly threshold
    #[serde(default)]
    pub anomaly_count: u32,
    #[serde(default)]
    pub event_count: u32,
}

/// Response from GET /ml/top-risk-users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopRiskUsersResponse {
    #[serde(default)]
    pub users: Vec<UserRisk>,
    #[serde(default)]
    pub total_users: u32,
    #[serde(default)]
    pub period: Option<String>,
}
