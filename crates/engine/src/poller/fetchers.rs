//! REST-backed snapshot fetchers

use super::SnapshotFetcher;
use async_trait::async_trait;
use threatfeed_core::{Alert, EventRecord, PipelineStatus, Result, UserRisk};
use threatfeed_networking::api::{fetch_alert_snapshot, fetch_event_snapshot, fetch_risk_by_user};
use threatfeed_networking::ThreatApiClient;

/// First page of the alerts list
pub struct AlertsFetcher {
    pub client: ThreatApiClient,
    pub page_size: u32,
}

#[async_trait]
impl SnapshotFetcher<Vec<Alert>> for AlertsFetcher {
    async fn fetch(&self) -> Result<Vec<Alert>> {
        fetch_alert_snapshot(&self.client, self.page_size).await
    }
}

/// Most recent events
pub struct EventsFetcher {
    pub client: ThreatApiClient,
    pub limit: u32,
}

#[async_trait]
impl SnapshotFetcher<Vec<EventRecord>> for EventsFetcher {
    async fn fetch(&self) -> Result<Vec<EventRecord>> {
        fetch_event_snapshot(&self.client, self.limit).await
    }
}

pub struct PipelineFetcher {
    pub client: ThreatApiClient,
}

#[async_trait]
impl SnapshotFetcher<PipelineStatus> for PipelineFetcher {
    async fn fetch(&self) -> Result<PipelineStatus> {
        self.client.pipeline_status().await
    }
}

/// Riskiest users over the server's trailing window
pub struct RiskByUserFetcher {
    pub client: ThreatApiClient,
    pub limit: u32,
}

#[async_trait]
impl SnapshotFetcher<Vec<UserRisk>> for RiskByUserFetcher {
    async fn fetch(&self) -> Result<Vec<UserRisk>> {
        fetch_risk_by_user(&self.client, self.limit).await
    }
}
