//! Per-consumer façade over the shared physical connection.

use std::sync::Arc;

use super::Connection;
use crate::domain::event::is_ready_alias;
use crate::domain::{ConsumerId, EventHandler, Outbound};
use crate::registry::RawConnection;

/// A consumer's view of the live connection.
///
/// Every operation only touches this consumer's own callbacks and joins.
/// Many live connections can share one [`RawConnection`]; disposing one
/// never closes it.
#[derive(Debug)]
pub struct LiveConnection {
    id: ConsumerId,
    raw: Arc<RawConnection>,
    disposed: bool,
}

impl LiveConnection {
    /// Creates a new consumer on `raw`.
    #[must_use]
    pub fn new(raw: Arc<RawConnection>) -> Self {
        Self {
            id: ConsumerId::new(),
            raw,
            disposed: false,
        }
    }

    /// This consumer's identity.
    #[must_use]
    pub const fn id(&self) -> ConsumerId {
        self.id
    }

    /// The shared physical connection.
    #[must_use]
    pub const fn raw(&self) -> &Arc<RawConnection> {
        &self.raw
    }

    /// Returns `true` after [`Connection::dispose`].
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Connection for LiveConnection {
    /// `ready` and `connect` both mean "handshake-ready" and go through
    /// [`RawConnection`]'s ready notification instead of the listener table.
    fn on(&self, event: &str, handler: EventHandler) {
        if self.disposed {
            return;
        }
        if is_ready_alias(event) {
            self.raw.notify_ready(handler);
        } else {
            self.raw.attach(self.id, event, handler);
        }
    }

    fn off(&self, event: &str, handler: &EventHandler) {
        self.raw.detach(self.id, event, handler);
    }

    fn emit(&self, op: Outbound) {
        if self.disposed {
            tracing::debug!(consumer = %self.id, event = %op.wire_name(), "emit on disposed connection ignored");
            return;
        }
        self.raw.send(self.id, op);
    }

    fn dispose(&mut self) {
        if std::mem::replace(&mut self.disposed, true) {
            return;
        }
        let left = self.raw.release(self.id);
        tracing::debug!(consumer = %self.id, connection = %self.raw.id(), left, "consumer disposed");
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.dispose();
    }
}
