//! HTTP client for the REST snapshot endpoints

mod client;

pub use client::ThreatApiClient;
