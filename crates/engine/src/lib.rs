//! Threatfeed Engine - reconciliation of live and polled data, notifications,
//! snapshot polling, and the session that ties them together

pub mod notify;
pub mod poller;
pub mod reconcile;
pub mod session;

pub use notify::{Notification, NotificationConfig, NotificationEmitter, TracingNotifier};
pub use reconcile::{merged_view, LiveBuffer, MergedState, ReconcileHandle, Reconciler};
pub use session::{LiveSession, SessionDeps};
