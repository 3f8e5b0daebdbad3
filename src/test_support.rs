//! Shared fixtures for unit tests: recording transports, counting
//! triggers, token builder.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use crate::domain::{EventHandler, SessionScope, TransportEvent};
use crate::error::RealtimeError;
use crate::registry::ReloadTrigger;
use crate::transport::{EventSender, Transport, TransportFactory};

/// Builds an unsigned JWT-shaped token expiring at `exp` (unix seconds).
pub(crate) fn make_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"3","tid":"7","exp":{exp}}}"#));
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// A token valid for the next hour.
pub(crate) fn valid_token() -> String {
    make_token(chrono::Utc::now().timestamp() + 3_600)
}

/// A handler counting its invocations.
pub(crate) fn counting_handler() -> (EventHandler, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let handler = EventHandler::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (handler, hits)
}

/// Lets spawned tasks (lifecycle drivers, reload timers) run to idle.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Runs `f` on its own thread; `false` if it has not returned by `timeout`.
///
/// A lock-order bug then fails the test instead of hanging the suite.
pub(crate) fn completes_within(timeout: Duration, f: impl FnOnce() + Send + 'static) -> bool {
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        f();
        let _ = done_tx.send(());
    });
    done_rx.recv_timeout(timeout).is_ok()
}

/// Transport that records outbound traffic.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    emitted: Mutex<Vec<(String, Value)>>,
    reconnects: AtomicUsize,
    closed: AtomicBool,
}

impl MockTransport {
    pub(crate) fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn clear(&self) {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn emit(&self, event: &str, payload: Value) {
        if self.is_closed() {
            return;
        }
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.to_string(), payload));
    }

    fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// One transport handed out by [`MockTransportFactory`].
#[derive(Debug, Clone)]
pub(crate) struct OpenedTransport {
    pub(crate) scope: SessionScope,
    pub(crate) token: String,
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) events: EventSender,
    /// Whether every earlier transport was already closed at open time.
    pub(crate) prior_all_closed: bool,
}

impl OpenedTransport {
    /// Delivers an inbound event to the lifecycle driver.
    pub(crate) fn fire(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

/// Factory handing out [`MockTransport`]s and remembering them.
#[derive(Debug, Default)]
pub(crate) struct MockTransportFactory {
    opened: Mutex<Vec<OpenedTransport>>,
}

impl MockTransportFactory {
    pub(crate) fn opened(&self) -> Vec<OpenedTransport> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn opened_count(&self) -> usize {
        self.opened().len()
    }

    pub(crate) fn last(&self) -> Option<OpenedTransport> {
        self.opened().last().cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(
        &self,
        scope: &SessionScope,
        token: &str,
        events: EventSender,
    ) -> Result<Arc<dyn Transport>, RealtimeError> {
        let transport = Arc::new(MockTransport::default());
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        let prior_all_closed = opened.iter().all(|o| o.transport.is_closed());
        opened.push(OpenedTransport {
            scope: scope.clone(),
            token: token.to_string(),
            transport: Arc::clone(&transport),
            events,
            prior_all_closed,
        });
        Ok(transport)
    }
}

/// Reload trigger counting requests.
#[derive(Debug, Default)]
pub(crate) struct CountingReload {
    count: AtomicUsize,
}

impl CountingReload {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ReloadTrigger for CountingReload {
    fn reload(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
