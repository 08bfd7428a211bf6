//! Data models for alerts, events, pipeline status, and live-update messages

mod alert;
mod event;
mod lenient;
mod message;
mod status;

pub use alert::*;
pub use event::*;
pub use lenient::parse_timestamp;
pub use message::*;
pub use status::*;
