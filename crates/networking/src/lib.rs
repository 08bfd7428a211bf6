//! Threatfeed Networking - REST client, live-update connection, and API wrappers

pub mod api;
pub mod http;
pub mod websocket;

pub use http::ThreatApiClient;
pub use websocket::{ConnectionManager, MessageDispatcher, TungsteniteTransport};
