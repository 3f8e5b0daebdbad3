//! Lifecycle driver for one physical connection.
//!
//! One task per [`RawConnection`] consumes the transport's event channel in
//! order. Sequential consumption is what guarantees the reconnect protocol:
//! callbacks are re-attached when `Connected` is processed, and topic
//! replay only happens when the following `ready` message is processed.

use std::sync::Arc;

use chrono::Utc;

use super::raw::RawConnection;
use super::reload::Reloader;
use crate::auth::{CredentialStore, is_expired};
use crate::domain::TransportEvent;
use crate::error::RealtimeError;
use crate::transport::EventReceiver;

/// Outcome of checking the stored credential.
#[derive(Debug)]
pub(crate) enum CredentialCheck {
    /// A token that has not expired yet.
    Valid(String),
    /// No token stored.
    ///
    /// Before connecting this means "not signed in": the caller gets a null
    /// connection and nothing is reloaded. After a disconnect it means the
    /// credential was removed from under a live session, which is handled
    /// like expiry.
    Missing,
    /// Token expired.
    Expired,
    /// Token could not be decoded.
    Malformed(RealtimeError),
}

impl CredentialCheck {
    pub(crate) fn of(store: &dyn CredentialStore) -> Self {
        let Some(token) = store.token() else {
            return Self::Missing;
        };
        match is_expired(&token, Utc::now()) {
            Ok(false) => Self::Valid(token),
            Ok(true) => Self::Expired,
            Err(e) => Self::Malformed(e),
        }
    }
}

/// Collaborators the driver needs besides the connection itself.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) reloader: Reloader,
}

impl Lifecycle {
    /// Consumes `events` until the transport drops its sender or the
    /// connection is torn down.
    pub(crate) async fn drive(self, raw: Arc<RawConnection>, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            if raw.is_closed() {
                break;
            }
            self.handle(&raw, event);
        }
        tracing::debug!(connection = %raw.id(), "lifecycle driver stopped");
    }

    pub(crate) fn handle(&self, raw: &RawConnection, event: TransportEvent) {
        match event {
            TransportEvent::Connected { recovered } => {
                let reconnect = raw.handle_connected(recovered);
                tracing::info!(
                    connection = %raw.id(),
                    scope = %raw.scope(),
                    recovered,
                    reconnect,
                    "transport connected"
                );
            }
            TransportEvent::ConnectError(error) => {
                tracing::warn!(connection = %raw.id(), %error, "transport connect error");
            }
            TransportEvent::Disconnected(reason) => {
                raw.handle_disconnected(reason.is_client_initiated());
                if reason.is_client_initiated() {
                    tracing::info!(connection = %raw.id(), %reason, "transport disconnected");
                    return;
                }
                tracing::warn!(connection = %raw.id(), %reason, "transport disconnected");
                self.recover(raw);
            }
            TransportEvent::Message { event, payload } => {
                tracing::trace!(connection = %raw.id(), %event, %payload, "inbound event");
                let replayed = raw.handle_message(&event, &payload);
                if replayed > 0 {
                    tracing::info!(connection = %raw.id(), replayed, "subscriptions replayed after handshake");
                }
            }
        }
    }

    /// Nudges the transport back up, or gives up on the session.
    fn recover(&self, raw: &RawConnection) {
        match CredentialCheck::of(self.credentials.as_ref()) {
            CredentialCheck::Valid(_) => raw.transport().reconnect(),
            CredentialCheck::Missing => {
                tracing::warn!(connection = %raw.id(), "credential gone after disconnect");
                self.reloader.schedule();
            }
            CredentialCheck::Expired => {
                tracing::warn!(connection = %raw.id(), "credential expired after disconnect");
                self.reloader.schedule();
            }
            CredentialCheck::Malformed(error) => {
                tracing::warn!(connection = %raw.id(), %error, kind = error.kind(), "credential unreadable after disconnect");
                self.reloader.schedule();
            }
        }
    }
}
