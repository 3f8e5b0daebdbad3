//! One physical connection and everything layered on it.
//!
//! [`RawConnection`] owns the transport handle, the attached listener
//! table, the records every consumer left behind, and the handshake-ready
//! flag for this connection's lifetime. State lives behind one mutex;
//! handlers and transport calls always run after the guard is dropped so
//! a handler may call straight back into the connection API.
//!
//! Handlers removed from the tables are also dropped only after the guard
//! is released. A handler can own a connection on this same
//! `RawConnection`, and dropping that connection re-enters via dispose.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::domain::{
    CallbackRecord, ConnectionState, ConsumerId, EventHandler, Outbound, Owned, READY_EVENT,
    SessionScope, SubscriptionRecord,
};
use crate::transport::Transport;

/// Mutable part of a [`RawConnection`].
#[derive(Debug)]
struct RawState {
    connectivity: ConnectionState,
    ready: bool,
    /// Set after the first `Connected`; later ones are reconnects.
    has_connected: bool,
    /// Armed by a genuine reconnect, consumed by the next `ready`.
    replay_armed: bool,
    ready_waiters: Vec<EventHandler>,
    /// Listeners currently attached, in dispatch order.
    listeners: Vec<CallbackRecord>,
    callbacks: Vec<Owned<CallbackRecord>>,
    /// Joins from all consumers, in issuance order.
    subscriptions: Vec<Owned<SubscriptionRecord>>,
}

/// A single physical realtime connection bound to one scope.
#[derive(Debug)]
pub struct RawConnection {
    id: uuid::Uuid,
    scope: SessionScope,
    transport: Arc<dyn Transport>,
    state: Mutex<RawState>,
}

impl RawConnection {
    /// Wraps a freshly opened transport. Starts `connecting`, not ready.
    #[must_use]
    pub fn new(scope: SessionScope, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            scope,
            transport,
            state: Mutex::new(RawState {
                connectivity: ConnectionState::Connecting,
                ready: false,
                has_connected: false,
                replay_armed: false,
                ready_waiters: Vec::new(),
                listeners: Vec::new(),
                callbacks: Vec::new(),
                subscriptions: Vec::new(),
            }),
        }
    }

    /// Unique id of this connection, for logs.
    #[must_use]
    pub const fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// The scope this connection is bound to. Never changes.
    #[must_use]
    pub const fn scope(&self) -> &SessionScope {
        &self.scope
    }

    /// Current connectivity.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock().connectivity
    }

    /// Whether the server has completed the handshake on the current link.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Returns `true` once torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Joins currently tracked for replay, in issuance order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.lock()
            .subscriptions
            .iter()
            .map(|s| s.record.clone())
            .collect()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn lock(&self) -> MutexGuard<'_, RawState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `handler` now if ready, otherwise on the next `ready` event.
    pub(crate) fn notify_ready(&self, handler: EventHandler) {
        {
            let mut state = self.lock();
            if state.connectivity == ConnectionState::Closed {
                tracing::debug!(connection = %self.id, "ready callback dropped: connection closed");
                return;
            }
            if !state.ready {
                state.ready_waiters.push(handler);
                return;
            }
        }
        handler.call(&Value::Null);
    }

    /// Tracks and attaches a listener on behalf of `owner`.
    pub(crate) fn attach(&self, owner: ConsumerId, event: &str, handler: EventHandler) {
        let mut state = self.lock();
        if state.connectivity == ConnectionState::Closed {
            return;
        }
        let record = CallbackRecord {
            event: event.to_string(),
            handler,
        };
        state.listeners.push(record.clone());
        state.callbacks.push(Owned { owner, record });
    }

    /// Untracks and detaches one matching listener of `owner`.
    pub(crate) fn detach(&self, owner: ConsumerId, event: &str, handler: &EventHandler) {
        let removed = {
            let mut state = self.lock();
            let Some(pos) = state
                .callbacks
                .iter()
                .position(|c| c.owner == owner && c.record.matches(event, handler))
            else {
                return;
            };
            let callback = state.callbacks.remove(pos);
            let listener_pos = state.listeners.iter().position(|l| l.matches(event, handler));
            let listener = listener_pos.map(|pos| state.listeners.remove(pos));
            (callback, listener)
        };
        drop(removed);
    }

    /// Forwards `op` to the transport, tracking joins first.
    pub(crate) fn send(&self, owner: ConsumerId, op: Outbound) {
        {
            let mut state = self.lock();
            if state.connectivity == ConnectionState::Closed {
                tracing::debug!(connection = %self.id, event = %op.wire_name(), "emit dropped: connection closed");
                return;
            }
            if let Outbound::Subscribe { topic, params } = &op {
                state.subscriptions.push(Owned {
                    owner,
                    record: SubscriptionRecord {
                        topic: topic.clone(),
                        params: params.clone(),
                    },
                });
            }
        }
        let event = op.wire_name();
        let payload = match op {
            Outbound::Subscribe { params, .. } => params,
            Outbound::Publish { payload, .. } => payload,
        };
        self.transport.emit(&event, payload);
    }

    /// Removes everything `owner` registered, leaving each of its topics.
    ///
    /// Returns the number of leave requests sent.
    pub(crate) fn release(&self, owner: ConsumerId) -> usize {
        let (joins, released, closed) = {
            let mut state = self.lock();
            let (joins, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.subscriptions)
                .into_iter()
                .partition(|s| s.owner == owner);
            state.subscriptions = rest;

            let (callbacks, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.callbacks)
                .into_iter()
                .partition(|c| c.owner == owner);
            state.callbacks = rest;
            let mut detached = Vec::with_capacity(callbacks.len());
            for cb in &callbacks {
                if let Some(pos) = state
                    .listeners
                    .iter()
                    .position(|l| l.matches(&cb.record.event, &cb.record.handler))
                {
                    detached.push(state.listeners.remove(pos));
                }
            }
            (
                joins,
                (callbacks, detached),
                state.connectivity == ConnectionState::Closed,
            )
        };
        drop(released);

        if closed {
            return 0;
        }
        for join in &joins {
            self.transport
                .emit(&join.record.leave_event(), join.record.params.clone());
        }
        joins.len()
    }

    /// Applies a transport connect.
    ///
    /// A genuine reconnect re-attaches every tracked callback (remove, then
    /// add) and arms topic replay for the next `ready`. Returns `true` for
    /// a genuine reconnect.
    pub(crate) fn handle_connected(&self, recovered: bool) -> bool {
        let mut state = self.lock();
        if state.connectivity == ConnectionState::Closed {
            return false;
        }
        let reconnect = state.has_connected;
        state.has_connected = true;
        state.connectivity = ConnectionState::Open;
        if !reconnect || recovered {
            return false;
        }

        let tracked: Vec<CallbackRecord> =
            state.callbacks.iter().map(|c| c.record.clone()).collect();
        state
            .listeners
            .retain(|l| !tracked.iter().any(|t| l.matches(&t.event, &t.handler)));
        state.listeners.extend(tracked);
        state.replay_armed = true;
        true
    }

    /// Dispatches a server-pushed event.
    ///
    /// On `ready`: sets the flag, replays tracked joins if a reconnect armed
    /// it, then fires pending ready callbacks. Returns the number of joins
    /// replayed.
    pub(crate) fn handle_message(&self, event: &str, payload: &Value) -> usize {
        let (replay, waiters, handlers) = {
            let mut state = self.lock();
            if state.connectivity == ConnectionState::Closed {
                return 0;
            }
            let mut replay = Vec::new();
            let mut waiters = Vec::new();
            if event == READY_EVENT {
                state.ready = true;
                if std::mem::take(&mut state.replay_armed) {
                    replay = state
                        .subscriptions
                        .iter()
                        .map(|s| s.record.clone())
                        .collect();
                }
                waiters = std::mem::take(&mut state.ready_waiters);
            }
            let handlers: Vec<EventHandler> = state
                .listeners
                .iter()
                .filter(|l| l.event == event)
                .map(|l| l.handler.clone())
                .collect();
            (replay, waiters, handlers)
        };

        for record in &replay {
            self.transport.emit(&record.join_event(), record.params.clone());
        }
        for waiter in waiters {
            waiter.call(payload);
        }
        for handler in handlers {
            handler.call(payload);
        }
        replay.len()
    }

    /// Applies a transport disconnect.
    pub(crate) fn handle_disconnected(&self, client_initiated: bool) {
        let mut state = self.lock();
        if state.connectivity == ConnectionState::Closed {
            return;
        }
        state.ready = false;
        state.replay_armed = false;
        state.connectivity = if client_initiated {
            ConnectionState::Closed
        } else {
            ConnectionState::Connecting
        };
    }

    /// Removes every listener, forgets all records and closes the transport.
    pub(crate) fn teardown(&self) {
        let released = {
            let mut state = self.lock();
            state.connectivity = ConnectionState::Closed;
            state.ready = false;
            state.replay_armed = false;
            state.subscriptions.clear();
            (
                std::mem::take(&mut state.ready_waiters),
                std::mem::take(&mut state.listeners),
                std::mem::take(&mut state.callbacks),
            )
        };
        self.transport.close();
        drop(released);
    }
}
