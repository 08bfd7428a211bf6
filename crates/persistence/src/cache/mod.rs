//! In-memory snapshot caches with explicit invalidation
//!
//! Each cache holds the latest REST snapshot of one kind. Invalidating a
//! cache drops the entry and bumps a generation counter on a watch channel,
//! which wakes the poller that owns the kind so it refetches right away.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use threatfeed_core::{Alert, EventRecord, PipelineStatus, SnapshotKind, UserRisk};
use tokio::sync::watch;
use tracing::debug;

/// Cached item with expiration
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Thread-safe holder for the latest snapshot of one kind
pub struct SnapshotCache<T> {
    kind: SnapshotKind,
    entry: RwLock<Option<CacheEntry<T>>>,
    default_ttl: Duration,
    generation: watch::Sender<u64>,
}

impl<T: Clone> SnapshotCache<T> {
    pub fn new(kind: SnapshotKind, default_ttl: Duration) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            kind,
            entry: RwLock::new(None),
            default_ttl,
            generation,
        }
    }

    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    /// Latest snapshot if present and not expired
    pub fn get(&self) -> Option<T> {
        let entry = self.entry.read().ok()?;
        let entry = entry.as_ref()?;

        if entry.is_expired() {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    /// Store a freshly fetched snapshot
    pub fn insert(&self, value: T) {
        if let Ok(mut entry) = self.entry.write() {
            *entry = Some(CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl: self.default_ttl,
            });
        }
    }

    /// Drop the snapshot and wake whoever refreshes it
    pub fn invalidate(&self) {
        if let Ok(mut entry) = self.entry.write() {
            *entry = None;
        }
        self.generation.send_modify(|g| *g += 1);
        debug!(kind = self.kind.as_str(), "Snapshot cache invalidated");
    }

    /// Number of invalidations so far
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Receiver that changes on every invalidation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub fn is_empty(&self) -> bool {
        self.get().is_none()
    }
}

/// The four snapshot caches one session works with. Each is shared with
/// the poller that refreshes it.
pub struct SnapshotCaches {
    pub alerts: Arc<SnapshotCache<Vec<Alert>>>,
    pub events: Arc<SnapshotCache<Vec<EventRecord>>>,
    pub pipeline: Arc<SnapshotCache<PipelineStatus>>,
    pub risk_by_user: Arc<SnapshotCache<Vec<UserRisk>>>,
}

impl SnapshotCaches {
    /// Each entry lives for two poll periods of its kind
    pub fn with_ttls(alerts: Duration, events: Duration, pipeline: Duration, risk: Duration) -> Self {
        Self {
            alerts: Arc::new(SnapshotCache::new(SnapshotKind::Alerts, alerts * 2)),
            events: Arc::new(SnapshotCache::new(SnapshotKind::Events, events * 2)),
            pipeline: Arc::new(SnapshotCache::new(SnapshotKind::PipelineStatus, pipeline * 2)),
            risk_by_user: Arc::new(SnapshotCache::new(SnapshotKind::RiskByUser, risk * 2)),
        }
    }

    pub fn invalidate(&self, kind: SnapshotKind) {
        match kind {
            SnapshotKind::Alerts => self.alerts.invalidate(),
            SnapshotKind::Events => self.events.invalidate(),
            SnapshotKind::PipelineStatus => self.pipeline.invalidate(),
            SnapshotKind::RiskByUser => self.risk_by_user.invalidate(),
        }
    }

    pub fn generation(&self, kind: SnapshotKind) -> u64 {
        match kind {
            SnapshotKind::Alerts => self.alerts.generation(),
            SnapshotKind::Events => self.events.generation(),
            SnapshotKind::PipelineStatus => self.pipeline.generation(),
            SnapshotKind::RiskByUser => self.risk_by_user.generation(),
        }
    }
}

impl Default for SnapshotCaches {
    fn default() -> Self {
        Self::with_ttls(
            Duration::from_secs(30),
            Duration::from_secs(15),
            Duration::from_secs(10),
            Duration::from_secs(60),
        )
    }
}
