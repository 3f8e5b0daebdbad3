//! Handler identity and the records consumers leave behind.
//!
//! A [`CallbackRecord`] remembers an `(event, handler)` registration so it
//! can be removed and re-attached across a reconnect. A
//! [`SubscriptionRecord`] remembers a join so it can be replayed.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::event::{JOIN_PREFIX, LEAVE_PREFIX};

/// Shared event handler with identity semantics.
///
/// Clones compare equal under [`EventHandler::same_as`]; two handlers built
/// from identical closures do not.
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(&Value) + Send + Sync>);

impl EventHandler {
    /// Wraps a closure as a handler.
    pub fn new(f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the handler.
    pub fn call(&self, payload: &Value) {
        (self.0)(payload);
    }

    /// Returns `true` if both values refer to the same handler instance.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// Identity of one consumer (managed connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(uuid::Uuid);

impl ConsumerId {
    /// Creates a new random consumer id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An `(event, handler)` registration made by a consumer.
#[derive(Debug, Clone)]
pub struct CallbackRecord {
    /// Event name the handler listens to.
    pub event: String,
    /// The handler.
    pub handler: EventHandler,
}

impl CallbackRecord {
    /// Returns `true` if this record is for `event` and `handler`.
    #[must_use]
    pub fn matches(&self, event: &str, handler: &EventHandler) -> bool {
        self.event == event && self.handler.same_as(handler)
    }
}

/// A join issued by a consumer, kept for replay after reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    /// Topic name without prefix.
    pub topic: String,
    /// Join parameters.
    pub params: Value,
}

impl SubscriptionRecord {
    /// Wire event name that (re)joins the topic.
    #[must_use]
    pub fn join_event(&self) -> String {
        format!("{JOIN_PREFIX}{}", self.topic)
    }

    /// Wire event name that leaves the topic.
    #[must_use]
    pub fn leave_event(&self) -> String {
        format!("{LEAVE_PREFIX}{}", self.topic)
    }
}

/// A record tagged with the consumer that created it.
#[derive(Debug, Clone)]
pub struct Owned<T> {
    /// Creating consumer.
    pub owner: ConsumerId,
    /// The record.
    pub record: T,
}
