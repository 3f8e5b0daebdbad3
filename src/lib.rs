//! # helpdesk-realtime
//!
//! Realtime connection manager for the multi-tenant WhatsApp
//! customer-service console.
//!
//! Every live-updating feature (notification counters, chat, dashboards,
//! task boards) obtains its realtime capability here. The crate keeps
//! exactly one physical connection per signed-in `(tenant, user)` scope,
//! survives network loss without losing server-side room membership,
//! never delivers an event twice after a reconnect, and degrades to a
//! no-op connection when there is no valid credential.
//!
//! ## Architecture
//!
//! ```text
//! Features
//!     │  acquire(scope) / on / off / emit / dispose
//!     ▼
//! ManagedConnection (connection/)   one per feature
//!     │
//!     ▼
//! ConnectionRegistry (registry/)    one per process
//!     ├── RawConnection             listeners, joins, ready flag
//!     ├── lifecycle driver task     connect → reattach, ready → replay
//!     ├── CredentialStore (auth/)   token expiry check
//!     └── Reloader                  full reload on expiry
//!     │
//!     ▼
//! Transport (transport/, ws/)       tokio-tungstenite WebSocket
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod registry;
pub mod transport;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{Connection, ManagedConnection};
pub use domain::{EventHandler, Outbound, SessionScope};
pub use error::RealtimeError;
pub use registry::ConnectionRegistry;
