//! REST client for the snapshot endpoints, authenticated with a bearer token

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT},
    Client, Response,
};
use serde::de::DeserializeOwned;
use threatfeed_core::{
    AlertListResponse, Error, EventRecord, PipelineStatus, Result, TopRiskUsersResponse,
    WebSocketServerStatus,
};
use tracing::{debug, error, instrument};

const USER_AGENT_VALUE: &str = concat!("threatfeed/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the alerts, events, and pipeline-status endpoints
///
/// Every request carries `Authorization: Bearer <token>`. The client holds
/// no state beyond the connection pool; caching happens in the snapshot
/// caches one layer up.
#[derive(Clone)]
pub struct ThreatApiClient {
    http: Client,
    api_base: String,
    server_root: String,
    token: String,
}

impl ThreatApiClient {
    /// Create a client for `api_base` (e.g. `http://host:8000/api`)
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| Error::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        let api_base = api_base.trim_end_matches('/').to_string();
        let server_root = api_base.trim_end_matches("/api").to_string();

        Ok(Self {
            http,
            api_base,
            server_root,
            token: token.to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| Error::AuthenticationError("token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);

        Ok(headers)
    }

    /// Check if response indicates authentication failure
    fn check_auth_error(response: &Response) -> Option<Error> {
        match response.status().as_u16() {
            401 => Some(Error::TokenExpired),
            403 => Some(Error::AuthenticationError("Access forbidden".to_string())),
            _ => None,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        debug!("Fetching {} from: {}", what, url);

        let response = self
            .http
            .get(url)
            .headers(self.default_headers()?)
            .send()
            .await?;

        debug!("{} response status: {}", what, response.status());

        if let Some(err) = Self::check_auth_error(&response) {
            return Err(err);
        }

        let response = response.error_for_status().map_err(|e| {
            error!("{} request failed: {}", what, e);
            Error::ApiError(e.to_string())
        })?;

        response.json().await.map_err(|e| {
            error!("Failed to parse {} response: {}", what, e);
            Error::InvalidData(e.to_string())
        })
    }

    /// Paginated alerts list, most recent first
    #[instrument(skip(self))]
    pub async fn list_alerts(&self, page: u32, page_size: u32) -> Result<AlertListResponse> {
        let url = format!(
            "{}/alerts/?page={}&page_size={}",
            self.api_base, page, page_size
        );
        let list: AlertListResponse = self.get_json(&url, "alerts").await?;
        debug!("Alerts fetched: {} of {}", list.alerts.len(), list.total);
        Ok(list)
    }

    /// Recent events across all users, most recent first
    #[instrument(skip(self))]
    pub async fn recent_events(&self, limit: u32, offset: u32) -> Result<Vec<EventRecord>> {
        let url = format!(
            "{}/events/all?limit={}&offset={}",
            self.api_base, limit, offset
        );
        let events: Vec<EventRecord> = self.get_json(&url, "events").await?;
        debug!("Events fetched: {}", events.len());
        Ok(events)
    }

    /// Pipeline/health snapshot
    #[instrument(skip(self))]
    pub async fn pipeline_status(&self) -> Result<PipelineStatus> {
        let url = format!("{}/ml/status", self.api_base);
        self.get_json(&url, "pipeline status").await
    }

    /// Highest-risk users over the server's trailing window, riskiest first
    #[instrument(skip(self))]
    pub async fn top_risk_users(&self, limit: u32) -> Result<TopRiskUsersResponse> {
        let url = format!("{}/ml/top-risk-users?limit={}", self.api_base, limit);
        let resp: TopRiskUsersResponse = self.get_json(&url, "top risk users").await?;
        debug!(
            "Top risk users fetched: {} of {}",
            resp.users.len(),
            resp.total_users
        );
        Ok(resp)
    }

    /// Live-update server's own view of its connections (unauthenticated)
    #[instrument(skip(self))]
    pub async fn websocket_status(&self) -> Result<WebSocketServerStatus> {
        let url = format!("{}/ws/status", self.server_root);
        self.get_json(&url, "websocket status").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ThreatApiClient {
        ThreatApiClient::new(&format!("{}/api", server.uri()), "tok-123").unwrap()
    }

    #[tokio::test]
    async fn test_list_alerts_sends_bearer_and_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/alerts/"))
            .and(query_param("page", "1"))
            .and(query_param("page_size", "50"))
            .and(header("authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "alerts": [{"alert_id": "a-1", "severity": "high", "created_at": "2024-05-01T10:00:00"}],
                "total": 1, "page": 1, "page_size": 50, "stats": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let list = client_for(&server).await.list_alerts(1, 50).await.unwrap();
        assert_eq!(list.alerts.len(), 1);
        assert_eq!(list.alerts[0].alert_id, "a-1");
    }

    #[tokio::test]
    async fn test_top_risk_users_query_and_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ml/top-risk-users"))
            .and(query_param("limit", "5"))
            .and(header("authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "users": [
                    {"user_id": 7, "username": "mallory", "department": "FINANCE",
                     "risk_score": 0.94, "avg_risk_score": 0.52, "anomaly_count": 4, "event_count": 11},
                    {"user_id": 3, "username": "bob", "department": "HR",
                     "risk_score": 0.31, "avg_risk_score": 0.2, "anomaly_count": 0, "event_count": 2}
                ],
                "total_users": 2,
                "period": "24h"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client_for(&server).await.top_risk_users(5).await.unwrap();
        assert_eq!(resp.users.len(), 2);
        assert_eq!(resp.users[0].user_id, "7");
        assert_eq!(resp.users[0].anomaly_count, 4);
        assert_eq!(resp.users[1].department.as_deref(), Some("HR"));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_token_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ml/status"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).await.pipeline_status().await.unwrap_err();
        assert!(matches!(err, Error::TokenExpired));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/events/all"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).await.recent_events(100, 0).await.unwrap_err();
        assert!(matches!(err, Error::ApiError(_)));
    }

    #[tokio::test]
    async fn test_bad_body_maps_to_invalid_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/events/all"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.recent_events(10, 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_websocket_status_uses_server_root() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "active_connections": 2, "connected_users": ["u-1", "u-2"]
            })))
            .mount(&server)
            .await;

        let status = client_for(&server).await.websocket_status().await.unwrap();
        assert_eq!(status.active_connections, 2);
    }
}
