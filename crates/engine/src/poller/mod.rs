//! Background snapshot pollers
//!
//! One task per snapshot kind. Each fetches immediately, then again on every
//! interval tick and whenever its cache is invalidated, until cancelled.
//! A failed fetch keeps the previous snapshot.

mod fetchers;

pub use fetchers::{AlertsFetcher, EventsFetcher, PipelineFetcher, RiskByUserFetcher};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use threatfeed_core::{Result, SnapshotKind};
use threatfeed_persistence::SnapshotCache;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Produces one snapshot of `T`
#[async_trait]
pub trait SnapshotFetcher<T>: Send + Sync {
    async fn fetch(&self) -> Result<T>;
}

/// Lifecycle of a poller task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PollerState {
    Running,
    Stopped,
}

/// Observable poller health
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerStatus {
    pub kind: SnapshotKind,
    pub state: PollerState,
    pub fetches: u64,
    pub failures: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Handle to one running poller
pub struct PollerHandle {
    kind: SnapshotKind,
    cancel_token: CancellationToken,
    status: Arc<RwLock<PollerStatus>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    pub async fn status(&self) -> PollerStatus {
        self.status.read().await.clone()
    }

    /// Signal the poller to stop without waiting
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Stop the poller and wait for the task to exit
    pub async fn stop(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            warn!(kind = self.kind.as_str(), error = %e, "Snapshot poller ended abnormally");
        }
    }
}

/// Spawn a poller for one snapshot kind.
///
/// Successful fetches are stored in `cache` and handed to `on_snapshot`.
pub fn spawn_poller<T, F, S>(
    fetcher: F,
    cache: Arc<SnapshotCache<T>>,
    interval: Duration,
    on_snapshot: S,
    cancel_token: CancellationToken,
) -> PollerHandle
where
    T: Clone + Send + Sync + 'static,
    F: SnapshotFetcher<T> + 'static,
    S: Fn(T) + Send + Sync + 'static,
{
    let kind = cache.kind();
    let status = Arc::new(RwLock::new(PollerStatus {
        kind,
        state: PollerState::Running,
        fetches: 0,
        failures: 0,
        last_success_at: None,
        last_error: None,
    }));

    let task = tokio::spawn(poll_loop(
        fetcher,
        cache,
        interval,
        on_snapshot,
        cancel_token.clone(),
        status.clone(),
    ));

    PollerHandle {
        kind,
        cancel_token,
        status,
        task,
    }
}

async fn poll_loop<T, F, S>(
    fetcher: F,
    cache: Arc<SnapshotCache<T>>,
    interval: Duration,
    on_snapshot: S,
    cancel_token: CancellationToken,
    status: Arc<RwLock<PollerStatus>>,
) where
    T: Clone + Send + Sync + 'static,
    F: SnapshotFetcher<T>,
    S: Fn(T) + Send + Sync,
{
    let kind = cache.kind().as_str();
    info!(kind, interval_secs = interval.as_secs(), "Snapshot poller started");

    let mut invalidated = cache.subscribe();
    // first tick completes immediately
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
            changed = invalidated.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!(kind, "Cache invalidated, refetching");
                ticker.reset();
            }
        }

        let result = tokio::select! {
            _ = cancel_token.cancelled() => break,
            result = fetcher.fetch() => result,
        };

        match result {
            Ok(snapshot) => {
                cache.insert(snapshot.clone());
                on_snapshot(snapshot);

                let mut s = status.write().await;
                s.fetches += 1;
                s.last_success_at = Some(Utc::now());
                s.last_error = None;
            }
            Err(e) => {
                warn!(kind, error = %e, "Snapshot fetch failed, keeping previous snapshot");
                let mut s = status.write().await;
                s.failures += 1;
                s.last_error = Some(e.to_string());
            }
        }
    }

    status.write().await.state = PollerState::Stopped;
    info!(kind, "Snapshot poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use threatfeed_core::Error;

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl SnapshotFetcher<Vec<u32>> for Counting {
        async fn fetch(&self) -> Result<Vec<u32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u32;
            if self.fail {
                Err(Error::NetworkError("connection refused".into()))
            } else {
                Ok(vec![n])
            }
        }
    }

    fn cache() -> Arc<SnapshotCache<Vec<u32>>> {
        Arc::new(SnapshotCache::new(SnapshotKind::Alerts, Duration::from_secs(600)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_immediately_then_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));
        let r = received.clone();
        let cache = cache();

        let handle = spawn_poller(
            Counting { calls: calls.clone(), fail: false },
            cache.clone(),
            Duration::from_secs(30),
            move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            },
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(), Some(vec![0]));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(received.load(Ordering::SeqCst), 3);

        let status = handle.status().await;
        assert_eq!(status.fetches, 3);
        assert_eq!(status.state, PollerState::Running);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_triggers_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache();
        let handle = spawn_poller(
            Counting { calls: calls.clone(), fail: false },
            cache.clone(),
            Duration::from_secs(30),
            |_| {},
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get(), Some(vec![1]));
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_recorded_and_cancel_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let handle = spawn_poller(
            Counting { calls: calls.clone(), fail: true },
            cache(),
            Duration::from_secs(10),
            |_| {},
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = handle.status().await;
        assert_eq!(status.failures, 1);
        assert!(status.last_error.unwrap().contains("connection refused"));

        token.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.status().await.state, PollerState::Stopped);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
