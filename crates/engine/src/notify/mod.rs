//! Notifications for high-severity live alerts

use serde::{Deserialize, Serialize};
use threatfeed_core::{Alert, Severity};
use tracing::warn;

/// Per-severity notification toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    /// Master switch
    pub enabled: bool,
    pub critical_alerts: bool,
    pub high_alerts: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            critical_alerts: true,
            high_alerts: true,
        }
    }
}

impl NotificationConfig {
    pub fn allows(&self, severity: Severity) -> bool {
        if !self.enabled {
            return false;
        }
        match severity {
            Severity::Critical => self.critical_alerts,
            Severity::High => self.high_alerts,
            _ => false,
        }
    }
}

/// A user-facing notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub alert_id: String,
}

impl Notification {
    /// Notification for a live alert, if its severity warrants one
    pub fn for_alert(alert: &Alert) -> Option<Self> {
        let severity = alert.effective_severity();
        if !severity.is_notifiable() {
            return None;
        }

        let title = match severity {
            Severity::Critical => "Critical alert",
            _ => "High-severity alert",
        };
        let who = alert
            .username
            .as_deref()
            .or(alert.user_id.as_deref())
            .unwrap_or("unknown user");
        let summary = if alert.summary.is_empty() {
            "New alert raised"
        } else {
            alert.summary.as_str()
        };

        Some(Self {
            title: title.to_string(),
            body: format!("{} ({}, risk {:.2})", summary, who, alert.risk_score),
            severity,
            alert_id: alert.alert_id.clone(),
        })
    }
}

/// Delivers notifications to the user
pub trait NotificationEmitter: Send + Sync {
    fn emit(&self, notification: &Notification);
}

/// Renders notifications as log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationEmitter for TracingNotifier {
    fn emit(&self, notification: &Notification) {
        warn!(
            severity = notification.severity.as_str(),
            alert_id = %notification.alert_id,
            "{}: {}",
            notification.title,
            notification.body
        );
    }
}
