//! Consumer-facing connection API.
//!
//! Features receive a [`ManagedConnection`] from
//! [`crate::registry::ConnectionRegistry::acquire`] and talk to it through
//! the [`Connection`] trait. Delivery is best-effort: nothing in this API
//! returns an error.

pub mod managed;
pub mod null;

use std::sync::Arc;

use serde_json::Value;

pub use self::managed::LiveConnection;
pub use self::null::NullConnection;
use crate::domain::{ConnectionState, EventHandler, Outbound, SessionScope};
use crate::registry::RawConnection;

/// Subscription API shared by live and null connections.
pub trait Connection {
    /// Registers `handler` for `event`. `ready`/`connect` fire once the
    /// server handshake completes (immediately if it already has).
    fn on(&self, event: &str, handler: EventHandler);

    /// Unregisters a handler previously passed to [`Connection::on`].
    fn off(&self, event: &str, handler: &EventHandler);

    /// Sends `op`. Subscribes are remembered and replayed after reconnects
    /// until [`Connection::dispose`].
    fn emit(&self, op: Outbound);

    /// Leaves every topic this consumer joined and unregisters all its
    /// handlers. The shared connection stays up.
    fn dispose(&mut self);

    /// Joins `topic` (sent as `join<topic>`).
    fn subscribe(&self, topic: &str, params: Value) {
        self.emit(Outbound::subscribe(topic, params));
    }

    /// Sends a plain event.
    fn publish(&self, event: &str, payload: Value) {
        self.emit(Outbound::publish(event, payload));
    }

    /// Sends an event by its wire name; `join`-prefixed names subscribe.
    fn emit_named(&self, event: &str, payload: Value) {
        self.emit(Outbound::from_event_name(event, payload));
    }
}

/// What [`crate::registry::ConnectionRegistry::acquire`] hands out.
#[derive(Debug)]
pub enum ManagedConnection {
    /// No usable session; every call is a no-op.
    Null(NullConnection),
    /// Layered on the live physical connection.
    Live(LiveConnection),
}

impl ManagedConnection {
    /// A no-op connection.
    #[must_use]
    pub const fn null() -> Self {
        Self::Null(NullConnection)
    }

    /// A new consumer on `raw`.
    #[must_use]
    pub fn live(raw: Arc<RawConnection>) -> Self {
        Self::Live(LiveConnection::new(raw))
    }

    /// Returns `true` for the no-op variant.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// The shared physical connection, if live.
    #[must_use]
    pub const fn raw(&self) -> Option<&Arc<RawConnection>> {
        match self {
            Self::Null(_) => None,
            Self::Live(live) => Some(live.raw()),
        }
    }

    /// Scope of the underlying connection, if live.
    #[must_use]
    pub fn scope(&self) -> Option<&SessionScope> {
        self.raw().map(|raw| raw.scope())
    }

    /// Connectivity of the underlying connection; `Closed` for null.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.raw()
            .map_or(ConnectionState::Closed, |raw| raw.state())
    }
}

impl Connection for ManagedConnection {
    fn on(&self, event: &str, handler: EventHandler) {
        match self {
            Self::Null(conn) => conn.on(event, handler),
            Self::Live(conn) => conn.on(event, handler),
        }
    }

    fn off(&self, event: &str, handler: &EventHandler) {
        match self {
            Self::Null(conn) => conn.off(event, handler),
            Self::Live(conn) => conn.off(event, handler),
        }
    }

    fn emit(&self, op: Outbound) {
        match self {
            Self::Null(conn) => conn.emit(op),
            Self::Live(conn) => conn.emit(op),
        }
    }

    fn dispose(&mut self) {
        match self {
            Self::Null(conn) => conn.dispose(),
            Self::Live(conn) => conn.dispose(),
        }
    }
}
