//! High-level API wrappers for the snapshot endpoints
//!
//! This module adds request validation and ordering on top of the raw HTTP
//! client.

mod alerts;
mod events;

pub use alerts::*;
pub use events::*;
