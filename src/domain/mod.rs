//! Domain layer: scope identity, event vocabulary and consumer records.
//!
//! This module contains the value types shared by the registry, the
//! managed connections and the transports. Nothing in here performs I/O.

pub mod event;
pub mod records;
pub mod scope;

pub use event::{
    CONNECT_EVENT, ConnectionState, DisconnectReason, JOIN_PREFIX, LEAVE_PREFIX, Outbound,
    READY_EVENT, TransportEvent,
};
pub use records::{CallbackRecord, ConsumerId, EventHandler, Owned, SubscriptionRecord};
pub use scope::SessionScope;
