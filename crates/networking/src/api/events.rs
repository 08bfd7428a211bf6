//! Event snapshot and top-risk-users fetching

use crate::ThreatApiClient;
use threatfeed_core::{Error, EventRecord, Result, UserRisk};
use tracing::debug;

/// Fetch the most recent events across all users
pub async fn fetch_event_snapshot(client: &ThreatApiClient, limit: u32) -> Result<Vec<EventRecord>> {
    if limit == 0 {
        return Err(Error::InvalidData("limit must be positive".to_string()));
    }
    client.recent_events(limit, 0).await
}

/// Fetch the riskiest users, highest peak score first
///
/// The server returns them ordered; the sort here only guards against a
/// server that does not.
pub async fn fetch_risk_by_user(client: &ThreatApiClient, limit: u32) -> Result<Vec<UserRisk>> {
    if limit == 0 {
        return Err(Error::InvalidData("limit must be positive".to_string()));
    }

    let resp = client.top_risk_users(limit).await?;
    debug!(
        users = resp.users.len(),
        period = resp.period.as_deref().unwrap_or("unknown"),
        "Risk-by-user snapshot"
    );

    let mut users = resp.users;
    users.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
    users.truncate(limit as usize);
    Ok(users)
}
