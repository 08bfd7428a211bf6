//! Threatfeed Persistence - snapshot caches and encrypted credential storage

pub mod cache;
pub mod credentials;
pub mod encryption;

pub use cache::{SnapshotCache, SnapshotCaches};
pub use credentials::CredentialStore;
pub use encryption::{machine_key, SealedToken, TokenCipher};
