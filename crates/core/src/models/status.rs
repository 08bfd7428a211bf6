//! Pipeline / health snapshots

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form pipeline/health fields carried by a `system_status` push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Response from GET /ml/status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    #[serde(default)]
    pub pipeline_active: bool,
    #[serde(default)]
    pub last_updated: Option<String>,

    #[serde(default)]
    pub users_monitored: u64,
    #[serde(default)]
    pub documents_processed: u64,
    #[serde(default)]
    pub total_events: u64,
    #[serde(default)]
    pub total_alerts: u64,

    #[serde(default)]
    pub events_today: u64,
    #[serde(default)]
    pub alerts_today: u64,
    #[serde(default)]
    pub anomalies_today: u64,
    #[serde(default)]
    pub critical_alerts: u64,
    #[serde(default)]
    pub events_24h: u64,
    #[serde(default)]
    pub avg_risk_score_today: f64,

    #[serde(default)]
    pub documents_by_department: HashMap<String, u64>,
    #[serde(default)]
    pub tampered_documents: u64,
    #[serde(default)]
    pub healthy_documents: u64,

    #[serde(default)]
    pub ml_model_loaded: bool,
    #[serde(default)]
    pub behavior_model_status: Option<String>,
    #[serde(default)]
    pub sensitivity_model_status: Option<String>,
    #[serde(default)]
    pub integrity_model_status: Option<String>,
}

/// Response from GET /ws/status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSocketServerStatus {
    pub active_connections: u32,
    #[serde(default)]
    pub connected_users: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_status_partial_payload() {
        let status: PipelineStatus = serde_json::from_str(
            r#"{"pipeline_active":true,"events_today":12,"avg_risk_score_today":0.231,
                "documents_by_department":{"HR":4}}"#,
        )
        .unwrap();
        assert!(status.pipeline_active);
        assert_eq!(status.events_today, 12);
        assert_eq!(status.total_alerts, 0);
        assert_eq!(status.documents_by_department.get("HR"), Some(&4));
    }
}
