//! Live-update connection: transport seam, keep-alive, dispatcher, and the
//! reconnecting Connection Manager

mod dispatcher;
mod keepalive;
mod manager;
mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use dispatcher::{MessageDispatcher, Subscriber};
pub use keepalive::KeepAlive;
pub use manager::ConnectionManager;
pub use transport::{Frame, Socket, Transport, TungsteniteTransport};
