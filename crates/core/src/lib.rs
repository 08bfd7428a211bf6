//! Threatfeed Core - Shared data models, types, config, and errors

pub mod config;
pub mod errors;
pub mod models;
pub mod types;

pub use config::ClientConfig;
pub use errors::{Error, Result};
pub use models::*;
pub use types::*;
