//! Client configuration: endpoints, timing constants, and poll cadences
//!
//! Every value is a fixed constant at runtime. `from_env` only overlays the
//! defaults once, at startup.

use crate::{Error, Result};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";
pub const DEFAULT_WS_ENDPOINT: &str = "ws://localhost:8000/ws/admin";

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_LIVE_BUFFER_CAPACITY: usize = 10;
pub const DEFAULT_MESSAGE_LOG_CAPACITY: usize = 100;

/// Timing and sizing for the live-update client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base, e.g. `http://host:8000/api`
    pub api_base: String,
    /// Live-update endpoint; parsed per connect attempt
    pub ws_endpoint: String,

    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub ping_interval: Duration,

    pub live_buffer_capacity: usize,
    pub message_log_capacity: usize,

    pub alerts_poll_interval: Duration,
    pub alerts_page_size: u32,
    pub events_poll_interval: Duration,
    pub events_limit: u32,
    pub pipeline_poll_interval: Duration,
    pub risk_poll_interval: Duration,
    pub risk_user_limit: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ping_interval: DEFAULT_PING_INTERVAL,
            live_buffer_capacity: DEFAULT_LIVE_BUFFER_CAPACITY,
            message_log_capacity: DEFAULT_MESSAGE_LOG_CAPACITY,
            alerts_poll_interval: Duration::from_secs(30),
            alerts_page_size: 50,
            events_poll_interval: Duration::from_secs(15),
            events_limit: 100,
            pipeline_poll_interval: Duration::from_secs(10),
            risk_poll_interval: Duration::from_secs(60),
            risk_user_limit: 10,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `THREATFEED_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup (env in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup("THREATFEED_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(endpoint) = lookup("THREATFEED_WS_URL") {
            config.ws_endpoint = endpoint;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "THREATFEED_RECONNECT_DELAY_SECS")? {
            config.reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<u32>(&lookup, "THREATFEED_MAX_RECONNECT_ATTEMPTS")? {
            config.max_reconnect_attempts = max;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "THREATFEED_PING_INTERVAL_SECS")? {
            config.ping_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the client spin or hold nothing
    pub fn validate(&self) -> Result<()> {
        if self.live_buffer_capacity == 0 {
            return Err(Error::ConfigError("live buffer capacity must be > 0".into()));
        }
        let intervals = [
            ("ping interval", self.ping_interval),
            ("alerts poll interval", self.alerts_poll_interval),
            ("events poll interval", self.events_poll_interval),
            ("pipeline poll interval", self.pipeline_poll_interval),
            ("risk poll interval", self.risk_poll_interval),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::ConfigError(format!("{} must be > 0", name)));
        }
        let limits = [
            ("alerts page size", self.alerts_page_size),
            ("events limit", self.events_limit),
            ("risk user limit", self.risk_user_limit),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, n)| *n == 0) {
            return Err(Error::ConfigError(format!("{} must be > 0", name)));
        }
        Ok(())
    }

    /// Root of the server (api base without the trailing `/api`)
    pub fn server_root(&self) -> &str {
        self.api_base
            .trim_end_matches('/')
            .trim_end_matches("/api")
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::ConfigError(format!("{} has invalid value '{}'", key, raw))),
    }
}
