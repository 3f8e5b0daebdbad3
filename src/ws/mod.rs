//! WebSocket transport: wire frames, session loop, reconnecting transport.
//!
//! The concrete [`crate::transport::Transport`] used in production. It
//! speaks JSON [`messages::WireFrame`]s over `tokio-tungstenite`.

pub mod connection;
pub mod messages;
pub mod transport;

pub use messages::WireFrame;
pub use transport::{WsTransport, WsTransportFactory};
