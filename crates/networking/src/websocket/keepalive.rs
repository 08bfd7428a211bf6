//! Keep-alive pulse for an open connection
//!
//! Pongs are not tracked: a peer that silently stops answering keeps the
//! connection `Open` until the transport itself reports the failure.

use std::time::Duration;
use threatfeed_core::Message;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Repeating ping timer; lives exactly as long as one open socket
pub struct KeepAlive {
    interval: Interval,
}

impl KeepAlive {
    /// First ping fires one full period after the connection opened
    pub fn start(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait for the next tick and build the ping to send. Cancel-safe.
    pub async fn tick(&mut self) -> Message {
        self.interval.tick().await;
        Message::ping()
    }
}
