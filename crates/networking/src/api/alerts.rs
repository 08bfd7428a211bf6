//! Alert snapshot fetching with request validation

use crate::ThreatApiClient;
use threatfeed_core::{Alert, Error, Result};
use tracing::{debug, warn};

/// Server-side upper bound for `page_size`
pub const MAX_ALERT_PAGE_SIZE: u32 = 100;

/// Fetch the first page of alerts (most recent first)
///
/// `page_size` is clamped to the server maximum rather than rejected.
pub async fn fetch_alert_snapshot(client: &ThreatApiClient, page_size: u32) -> Result<Vec<Alert>> {
    if page_size == 0 {
        return Err(Error::InvalidData("page_size must be positive".to_string()));
    }

    let effective = page_size.min(MAX_ALERT_PAGE_SIZE);
    if effective != page_size {
        warn!(
            "Clamped alert page size from {} to {}",
            page_size, effective
        );
    }

    let list = client.list_alerts(1, effective).await?;
    debug!(
        fetched = list.alerts.len(),
        total = list.total,
        open = list.stats.open,
        "Alert snapshot fetched"
    );
    Ok(list.alerts)
}
