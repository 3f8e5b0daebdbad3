//! Transport seam: the physical realtime connection primitive.
//!
//! A [`TransportFactory`] opens one connection bound to a scope and a
//! bearer token. Outbound traffic goes through the [`Transport`] handle;
//! everything inbound (connect, errors, disconnects and server-pushed
//! events) is delivered as [`TransportEvent`]s on the channel handed to
//! [`TransportFactory::open`], in arrival order.
//!
//! Reconnection policy (backoff, retries) belongs to the transport.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::{SessionScope, TransportEvent};
use crate::error::RealtimeError;

/// Sender half transports use to report inbound activity.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half consumed by the registry's lifecycle driver.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Outbound handle to one physical connection.
///
/// All methods return immediately.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends a named event with `payload`.
    fn emit(&self, event: &str, payload: Value);

    /// Asks the transport to reconnect now. Ignored while connected.
    fn reconnect(&self);

    /// Closes the connection for good. Later calls are no-ops.
    fn close(&self);
}

/// Opens physical connections.
pub trait TransportFactory: Send + Sync + fmt::Debug {
    /// Starts connecting on behalf of `scope`, carrying `token` as
    /// connection metadata.
    ///
    /// # Errors
    ///
    /// Returns a [`RealtimeError`] if the connection cannot even be
    /// attempted (bad endpoint, bad metadata). Network failures are
    /// reported later as [`TransportEvent::ConnectError`].
    fn open(
        &self,
        scope: &SessionScope,
        token: &str,
        events: EventSender,
    ) -> Result<Arc<dyn Transport>, RealtimeError>;
}
