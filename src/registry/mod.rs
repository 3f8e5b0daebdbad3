//! Connection registry: at most one physical connection per process.
//!
//! [`ConnectionRegistry`] is a constructed context object. Build it once at
//! startup and hand clones to every feature that needs realtime updates.
//! It owns the current [`RawConnection`], rebuilds it when the session
//! scope changes, and hands out a fresh [`ManagedConnection`] per
//! acquisition.
//!
//! ```text
//! acquire(scope)
//!     │
//!     ├── no scope, nothing live ─────────────► Null
//!     ├── same scope as live connection ──────► Live(existing)
//!     ├── other scope ── tear down live one ──┐
//!     │                                       ▼
//!     ├── credential missing ─────────────────► Null
//!     ├── credential expired / unreadable ────► Null + reload
//!     └── open transport, spawn driver ───────► Live(new)
//! ```

mod lifecycle;
pub mod raw;
pub mod reload;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use self::lifecycle::{CredentialCheck, Lifecycle};
pub use self::raw::RawConnection;
pub use self::reload::{NotifyReload, ReloadTrigger, Reloader};
use crate::auth::CredentialStore;
use crate::config::RealtimeConfig;
use crate::connection::ManagedConnection;
use crate::domain::{ConnectionState, EventHandler, SessionScope};
use crate::transport::TransportFactory;

/// The live connection and the task driving it.
#[derive(Debug)]
struct Current {
    raw: Arc<RawConnection>,
    driver: JoinHandle<()>,
}

impl Current {
    fn teardown(self) {
        tracing::info!(connection = %self.raw.id(), scope = %self.raw.scope(), "tearing down connection");
        self.driver.abort();
        self.raw.teardown();
    }
}

#[derive(Debug)]
struct RegistryInner {
    factory: Arc<dyn TransportFactory>,
    lifecycle: Lifecycle,
    current: Mutex<Option<Current>>,
    /// Ready callbacks registered while no connection existed.
    pending_ready: Mutex<Vec<EventHandler>>,
}

/// Owner of the process-wide physical connection.
///
/// Cheap to clone; clones share state.
///
/// # Concurrency
///
/// Every operation returns immediately. Scope changes tear down the old
/// connection and create the new one under a single lock, so no acquire
/// ever observes two live scopes.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        credentials: Arc<dyn CredentialStore>,
        reload: Arc<dyn ReloadTrigger>,
        config: &RealtimeConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                factory,
                lifecycle: Lifecycle {
                    credentials,
                    reloader: Reloader::new(reload, config.reload_delay),
                },
                current: Mutex::new(None),
                pending_ready: Mutex::new(Vec::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Current>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a connection for `scope`.
    ///
    /// Never fails: every problem degrades to a null connection, possibly
    /// with a reload scheduled. A missing or invalid `scope` reuses the
    /// live connection if there is one.
    pub fn acquire(&self, scope: Option<SessionScope>) -> ManagedConnection {
        let mut current = self.lock();

        let Some(scope) = scope.filter(SessionScope::is_valid) else {
            return match current.as_ref() {
                Some(live) => ManagedConnection::live(Arc::clone(&live.raw)),
                None => {
                    tracing::debug!("no session scope, handing out null connection");
                    ManagedConnection::null()
                }
            };
        };

        if let Some(live) = current.as_ref()
            && live.raw.scope() == &scope
        {
            return ManagedConnection::live(Arc::clone(&live.raw));
        }

        if let Some(old) = current.take() {
            old.teardown();
        }

        let token = match CredentialCheck::of(self.inner.lifecycle.credentials.as_ref()) {
            CredentialCheck::Valid(token) => token,
            CredentialCheck::Missing => {
                tracing::debug!(%scope, "no credential, handing out null connection");
                return ManagedConnection::null();
            }
            CredentialCheck::Expired => {
                tracing::warn!(%scope, "credential expired, not connecting");
                self.inner.lifecycle.reloader.schedule();
                return ManagedConnection::null();
            }
            CredentialCheck::Malformed(error) => {
                tracing::warn!(%scope, %error, kind = error.kind(), "credential unreadable, not connecting");
                self.inner.lifecycle.reloader.schedule();
                return ManagedConnection::null();
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(%scope, "acquire called outside a tokio runtime");
            return ManagedConnection::null();
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = match self.inner.factory.open(&scope, &token, events_tx) {
            Ok(transport) => transport,
            Err(error) => {
                tracing::error!(%scope, %error, kind = error.kind(), "failed to open transport");
                return ManagedConnection::null();
            }
        };

        let raw = Arc::new(RawConnection::new(scope, transport));
        let pending = std::mem::take(
            &mut *self
                .inner
                .pending_ready
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for callback in pending {
            raw.notify_ready(callback);
        }
        let driver = runtime.spawn(
            self.inner
                .lifecycle
                .clone()
                .drive(Arc::clone(&raw), events_rx),
        );
        tracing::info!(connection = %raw.id(), scope = %raw.scope(), "connection created");

        *current = Some(Current {
            raw: Arc::clone(&raw),
            driver,
        });
        ManagedConnection::live(raw)
    }

    /// Acquires for the scope held by the credential store.
    pub fn acquire_current(&self) -> ManagedConnection {
        self.acquire(self.inner.lifecycle.credentials.scope())
    }

    /// Runs `callback` once the live connection is handshake-ready:
    /// immediately if it already is, otherwise on its next `ready` event.
    ///
    /// With no live connection the callback waits for the first `ready` of
    /// the next connection this registry creates. Callbacks still waiting
    /// on a connection that is torn down are discarded with it.
    pub fn notify_ready(&self, callback: EventHandler) {
        let current = self.lock();
        let Some(raw) = current.as_ref().map(|c| Arc::clone(&c.raw)) else {
            tracing::debug!("no connection yet, ready callback deferred");
            self.inner
                .pending_ready
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(callback);
            return;
        };
        drop(current);
        raw.notify_ready(callback);
    }

    /// Scope of the live connection.
    #[must_use]
    pub fn current_scope(&self) -> Option<SessionScope> {
        self.lock().as_ref().map(|c| c.raw.scope().clone())
    }

    /// Connectivity of the live connection, `None` if there is none.
    #[must_use]
    pub fn state(&self) -> Option<ConnectionState> {
        self.lock().as_ref().map(|c| c.raw.state())
    }

    /// Whether the live connection is handshake-ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock().as_ref().is_some_and(|c| c.raw.is_ready())
    }

    /// Tears down the live connection, if any.
    pub fn shutdown(&self) {
        if let Some(old) = self.lock().take() {
            old.teardown();
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;
    use crate::connection::Connection;
    use crate::domain::{DisconnectReason, READY_EVENT, TransportEvent};
    use crate::test_support::{
        CountingReload, MockTransportFactory, completes_within, counting_handler, make_token,
        settle, valid_token,
    };
    use serde_json::{Value, json};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        registry: ConnectionRegistry,
        factory: Arc<MockTransportFactory>,
        store: Arc<MemoryCredentialStore>,
        reload: Arc<CountingReload>,
    }

    fn harness_with(token: &str) -> Harness {
        let factory = Arc::new(MockTransportFactory::default());
        let store = Arc::new(MemoryCredentialStore::signed_in(
            token,
            SessionScope::new("7", "3"),
        ));
        let reload = Arc::new(CountingReload::default());
        let config = RealtimeConfig {
            reload_delay: Duration::ZERO,
            ..RealtimeConfig::default()
        };
        let registry = ConnectionRegistry::new(
            Arc::<MockTransportFactory>::clone(&factory),
            Arc::<MemoryCredentialStore>::clone(&store),
            Arc::<CountingReload>::clone(&reload),
            &config,
        );
        Harness {
            registry,
            factory,
            store,
            reload,
        }
    }

    fn harness() -> Harness {
        harness_with(&valid_token())
    }

    fn scope_a() -> Option<SessionScope> {
        Some(SessionScope::new("7", "3"))
    }

    fn scope_b() -> Option<SessionScope> {
        Some(SessionScope::new("8", "3"))
    }

    #[tokio::test]
    async fn same_scope_shares_one_connection() {
        let h = harness();
        let first = h.registry.acquire(scope_a());
        let second = h.registry.acquire(scope_a());
        assert!(!first.is_null());
        assert!(!second.is_null());
        assert_eq!(h.factory.opened_count(), 1);
    }

    #[tokio::test]
    async fn scope_is_string_normalized() {
        let h = harness();
        let _a = h.registry.acquire(Some(SessionScope::new(7, 3)));
        let _b = h.registry.acquire(Some(SessionScope::new("7", " 3")));
        assert_eq!(h.factory.opened_count(), 1);
    }

    #[tokio::test]
    async fn scope_change_tears_down_before_creating() {
        let h = harness();
        let first = h.registry.acquire(scope_a());
        let (handler, _) = counting_handler();
        first.on("newMessage", handler);
        let Some(old_raw) = first.raw() else {
            panic!("expected a live connection");
        };
        assert_eq!(old_raw.listener_count(), 1);

        let second = h.registry.acquire(scope_b());
        assert_eq!(h.factory.opened_count(), 2);
        assert!(old_raw.is_closed());
        assert_eq!(old_raw.listener_count(), 0);

        let opened = h.factory.opened();
        let Some(first_open) = opened.first() else {
            panic!("first transport missing");
        };
        let Some(second_open) = opened.get(1) else {
            panic!("second transport missing");
        };
        assert!(first_open.transport.is_closed());
        assert!(second_open.prior_all_closed);
        assert_eq!(second_open.scope, SessionScope::new("8", "3"));
        assert_eq!(h.registry.current_scope(), scope_b());
        drop(second);
    }

    #[tokio::test]
    async fn absent_scope_without_connection_is_null() {
        let h = harness();
        let conn = h.registry.acquire(None);
        assert!(conn.is_null());
        assert_eq!(h.factory.opened_count(), 0);

        let invalid = h.registry.acquire(Some(SessionScope::new("", "3")));
        assert!(invalid.is_null());
        assert_eq!(h.factory.opened_count(), 0);
    }

    #[tokio::test]
    async fn absent_scope_reuses_live_connection() {
        let h = harness();
        let _live = h.registry.acquire(scope_a());
        let reused = h.registry.acquire(None);
        assert!(!reused.is_null());
        assert_eq!(h.factory.opened_count(), 1);
    }

    #[tokio::test]
    async fn expired_credential_yields_null_and_one_reload() {
        let h = harness_with(&make_token(1));
        let conn = h.registry.acquire(scope_a());
        let again = h.registry.acquire(scope_a());
        assert!(conn.is_null());
        assert!(again.is_null());
        assert_eq!(h.factory.opened_count(), 0);

        settle().await;
        assert_eq!(h.reload.count(), 1);
    }

    #[tokio::test]
    async fn malformed_credential_is_treated_as_expired() {
        let h = harness_with("not-a-token");
        assert!(h.registry.acquire(scope_a()).is_null());
        settle().await;
        assert_eq!(h.reload.count(), 1);
        assert_eq!(h.factory.opened_count(), 0);
    }

    #[tokio::test]
    async fn missing_credential_is_null_without_reload() {
        let h = harness();
        h.store.clear();
        assert!(h.registry.acquire(scope_a()).is_null());
        settle().await;
        assert_eq!(h.reload.count(), 0);
    }

    #[tokio::test]
    async fn acquire_current_uses_stored_scope() {
        let h = harness();
        let _conn = h.registry.acquire_current();
        assert_eq!(h.registry.current_scope(), scope_a());
        let Some(opened) = h.factory.last() else {
            panic!("expected a transport");
        };
        assert_eq!(opened.token, h.store.token().unwrap_or_default());
    }

    #[test]
    fn acquire_outside_runtime_degrades_to_null() {
        let h = harness();
        assert!(h.registry.acquire(scope_a()).is_null());
        assert_eq!(h.factory.opened_count(), 0);
    }

    #[tokio::test]
    async fn ready_scenario_and_synchronous_notify() {
        let h = harness();
        let conn = h.registry.acquire(scope_a());
        let (cb, hits) = counting_handler();
        conn.on(READY_EVENT, cb);

        let Some(opened) = h.factory.last() else {
            panic!("expected a transport");
        };
        opened.fire(TransportEvent::Connected { recovered: false });
        opened.fire(TransportEvent::Message {
            event: READY_EVENT.to_string(),
            payload: Value::Null,
        });
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(h.registry.is_ready());

        let _again = h.registry.acquire(scope_a());
        let (late, late_hits) = counting_handler();
        h.registry.notify_ready(late);
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ready_flag_resets_on_scope_change() {
        let h = harness();
        let _a = h.registry.acquire(scope_a());
        let Some(first) = h.factory.last() else {
            panic!("expected a transport");
        };
        first.fire(TransportEvent::Connected { recovered: false });
        first.fire(TransportEvent::Message {
            event: READY_EVENT.to_string(),
            payload: Value::Null,
        });
        settle().await;
        assert!(h.registry.is_ready());

        let _b = h.registry.acquire(scope_b());
        assert!(!h.registry.is_ready());
        let (cb, hits) = counting_handler();
        h.registry.notify_ready(cb);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let Some(second) = h.factory.last() else {
            panic!("expected a transport");
        };
        second.fire(TransportEvent::Connected { recovered: false });
        second.fire(TransportEvent::Message {
            event: READY_EVENT.to_string(),
            payload: Value::Null,
        });
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn join_is_replayed_only_after_ready() {
        let h = harness();
        let conn = h.registry.acquire(scope_a());
        let Some(opened) = h.factory.last() else {
            panic!("expected a transport");
        };
        opened.fire(TransportEvent::Connected { recovered: false });
        conn.emit_named("joinChat", json!({ "chatId": 42 }));
        settle().await;
        opened.transport.clear();

        opened.fire(TransportEvent::Disconnected(DisconnectReason::TransportClose));
        opened.fire(TransportEvent::Connected { recovered: false });
        settle().await;
        assert!(opened.transport.emitted().is_empty());
        assert_eq!(opened.transport.reconnects(), 1);

        opened.fire(TransportEvent::Message {
            event: READY_EVENT.to_string(),
            payload: Value::Null,
        });
        settle().await;
        assert_eq!(
            opened.transport.emitted(),
            vec![("joinChat".to_string(), json!({ "chatId": 42 }))]
        );
    }

    #[tokio::test]
    async fn no_duplicate_delivery_after_reconnect() {
        let h = harness();
        let conn = h.registry.acquire(scope_a());
        let (handler, hits) = counting_handler();
        conn.on("newMessage", handler);

        let Some(opened) = h.factory.last() else {
            panic!("expected a transport");
        };
        opened.fire(TransportEvent::Connected { recovered: false });
        opened.fire(TransportEvent::Disconnected(DisconnectReason::ServerDisconnect));
        opened.fire(TransportEvent::Connected { recovered: false });
        opened.fire(TransportEvent::Message {
            event: "newMessage".to_string(),
            payload: json!({ "id": 1 }),
        });
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispose_leaves_shared_connection_open() {
        let h = harness();
        let mut feature = h.registry.acquire(scope_a());
        let _other = h.registry.acquire(scope_a());
        let Some(opened) = h.factory.last() else {
            panic!("expected a transport");
        };
        opened.fire(TransportEvent::Connected { recovered: false });
        settle().await;

        feature.subscribe("Chat", json!({ "chatId": 1 }));
        feature.subscribe("Tickets", json!({ "queue": 2 }));
        opened.transport.clear();

        feature.dispose();
        assert_eq!(
            opened.transport.emitted(),
            vec![
                ("leaveChat".to_string(), json!({ "chatId": 1 })),
                ("leaveTickets".to_string(), json!({ "queue": 2 })),
            ]
        );
        assert!(!opened.transport.is_closed());
        assert_eq!(h.registry.state(), Some(ConnectionState::Open));
    }

    #[tokio::test]
    async fn shutdown_closes_connection() {
        let h = harness();
        let _conn = h.registry.acquire(scope_a());
        h.registry.shutdown();
        assert!(h.registry.state().is_none());
        let Some(opened) = h.factory.last() else {
            panic!("expected a transport");
        };
        assert!(opened.transport.is_closed());
    }

    #[tokio::test]
    async fn expiry_after_disconnect_schedules_reload() {
        let h = harness();
        let _conn = h.registry.acquire(scope_a());
        let Some(opened) = h.factory.last() else {
            panic!("expected a transport");
        };
        opened.fire(TransportEvent::Connected { recovered: false });
        h.store.set_token(make_token(1));
        opened.fire(TransportEvent::Disconnected(DisconnectReason::ServerDisconnect));
        settle().await;

        assert_eq!(h.reload.count(), 1);
        assert_eq!(opened.transport.reconnects(), 0);
    }

    #[tokio::test]
    async fn handler_owning_its_connection_does_not_block_scope_change() {
        let h = harness();
        let conn = Arc::new(h.registry.acquire(scope_a()));
        let captured = Arc::clone(&conn);
        conn.on(
            "newMessage",
            EventHandler::new(move |payload| captured.publish("ack", payload.clone())),
        );
        drop(conn);

        let registry = h.registry.clone();
        assert!(completes_within(Duration::from_secs(2), move || {
            drop(registry.acquire(scope_b()));
        }));
        let Some(first) = h.factory.opened().into_iter().next() else {
            panic!("first transport missing");
        };
        assert!(first.transport.is_closed());
    }

    #[tokio::test]
    async fn ready_callback_before_any_connection_waits_for_next_one() {
        let h = harness();
        let (cb, hits) = counting_handler();
        h.registry.notify_ready(cb);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let _conn = h.registry.acquire(scope_a());
        let Some(opened) = h.factory.last() else {
            panic!("expected a transport");
        };
        opened.fire(TransportEvent::Connected { recovered: false });
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        opened.fire(TransportEvent::Message {
            event: READY_EVENT.to_string(),
            payload: Value::Null,
        });
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // handed over once, not again to a later connection
        let _other = h.registry.acquire(scope_b());
        let Some(second) = h.factory.last() else {
            panic!("expected a second transport");
        };
        second.fire(TransportEvent::Connected { recovered: false });
        second.fire(TransportEvent::Message {
            event: READY_EVENT.to_string(),
            payload: Value::Null,
        });
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
