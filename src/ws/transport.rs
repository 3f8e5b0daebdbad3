//! WebSocket [`Transport`] on `tokio-tungstenite`.
//!
//! Each opened transport is one background task that connects, runs a
//! session, and retries after the link drops. Connection metadata travels
//! as handshake headers: `Authorization: Bearer <token>`, `X-Tenant-Id`
//! and `X-User-Id`.
//!
//! Retry policy:
//! - connect failures, stream errors and EOF retry after the configured delay;
//! - a server-initiated close waits for an explicit [`Transport::reconnect`];
//! - [`Transport::close`] ends the task.
//!
//! Frames emitted before the first connect are queued and flushed once the
//! socket is up. Frames emitted while a dropped link is being re-established
//! are discarded: the registry replays tracked joins after the handshake.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderName, HeaderValue};

use super::connection::{Command, SessionEnd, run_session};
use super::messages::WireFrame;
use crate::config::RealtimeConfig;
use crate::domain::{DisconnectReason, SessionScope, TransportEvent};
use crate::error::RealtimeError;
use crate::transport::{EventSender, Transport, TransportFactory};

const TENANT_HEADER: &str = "x-tenant-id";
const USER_HEADER: &str = "x-user-id";

/// Handle to one WebSocket transport task.
#[derive(Debug)]
pub struct WsTransport {
    commands: mpsc::UnboundedSender<Command>,
    closed: AtomicBool,
}

impl Transport for WsTransport {
    fn emit(&self, event: &str, payload: Value) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self
            .commands
            .send(Command::Emit(WireFrame::new(event, payload)));
    }

    fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Close);
        }
    }
}

/// Opens [`WsTransport`]s against one endpoint.
#[derive(Debug, Clone)]
pub struct WsTransportFactory {
    url: String,
    reconnect_delay: Duration,
}

impl WsTransportFactory {
    /// Creates a factory for `config.url`.
    #[must_use]
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            url: config.url.clone(),
            reconnect_delay: config.reconnect_delay,
        }
    }
}

impl TransportFactory for WsTransportFactory {
    fn open(
        &self,
        scope: &SessionScope,
        token: &str,
        events: EventSender,
    ) -> Result<Arc<dyn Transport>, RealtimeError> {
        let endpoint = Endpoint {
            url: self.url.clone(),
            scope: scope.clone(),
            token: token.to_string(),
        };
        // fail fast on a bad url or unencodable metadata
        endpoint.request()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RealtimeError::Transport(format!("no tokio runtime: {e}")))?;

        let (commands, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_transport(endpoint, rx, events, self.reconnect_delay));

        Ok(Arc::new(WsTransport {
            commands,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Everything needed to (re)build the handshake request.
#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    scope: SessionScope,
    token: String,
}

impl Endpoint {
    fn request(&self) -> Result<Request, RealtimeError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidUrl(format!("{}: {e}", self.url)))?;

        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", self.token))?);
        headers.insert(
            HeaderName::from_static(TENANT_HEADER),
            header_value(self.scope.tenant_id())?,
        );
        headers.insert(
            HeaderName::from_static(USER_HEADER),
            header_value(self.scope.user_id())?,
        );
        Ok(request)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RealtimeError> {
    HeaderValue::from_str(value)
        .map_err(|e| RealtimeError::Transport(format!("invalid connection metadata: {e}")))
}

/// Connect / session / retry loop for one transport.
async fn run_transport(
    endpoint: Endpoint,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventSender,
    retry_delay: Duration,
) {
    let mut pending: Vec<WireFrame> = Vec::new();
    let mut has_connected = false;

    loop {
        let request = match endpoint.request() {
            Ok(request) => request,
            Err(error) => {
                let _ = events.send(TransportEvent::ConnectError(error.to_string()));
                return;
            }
        };

        let keep = !has_connected;
        let attempt = tokio::select! {
            result = connect_async(request) => result,
            () = until_closed(&mut commands, &mut pending, keep) => return,
        };

        let socket = match attempt {
            Ok((socket, _response)) => socket,
            Err(error) => {
                tracing::debug!(url = %endpoint.url, %error, "websocket connect failed");
                if events
                    .send(TransportEvent::ConnectError(error.to_string()))
                    .is_err()
                {
                    return;
                }
                if !wait_for_retry(&mut commands, &mut pending, keep, retry_delay, true).await {
                    return;
                }
                continue;
            }
        };

        has_connected = true;
        if events
            .send(TransportEvent::Connected { recovered: false })
            .is_err()
        {
            return;
        }

        let queued = std::mem::take(&mut pending);
        match run_session(socket, queued, &mut commands, &events).await {
            SessionEnd::Closed => {
                let _ = events.send(TransportEvent::Disconnected(
                    DisconnectReason::ClientDisconnect,
                ));
                return;
            }
            SessionEnd::Dropped(reason) => {
                let auto_retry = reason != DisconnectReason::ServerDisconnect;
                if events.send(TransportEvent::Disconnected(reason)).is_err() {
                    return;
                }
                if !wait_for_retry(&mut commands, &mut pending, false, retry_delay, auto_retry)
                    .await
                {
                    return;
                }
            }
        }
    }
}

/// Queues or discards an emit issued while no socket is up.
fn hold(frame: WireFrame, pending: &mut Vec<WireFrame>, keep: bool) {
    if keep {
        pending.push(frame);
    } else {
        tracing::debug!(event = %frame.event, "emit while disconnected dropped");
    }
}

/// Completes only when the transport is closed.
async fn until_closed(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut Vec<WireFrame>,
    keep: bool,
) {
    loop {
        match commands.recv().await {
            Some(Command::Emit(frame)) => hold(frame, pending, keep),
            Some(Command::Reconnect) => {}
            Some(Command::Close) | None => return,
        }
    }
}

/// Waits until the next attempt is due. Returns `false` if closed.
///
/// Without `auto_retry` only an explicit reconnect request ends the wait.
async fn wait_for_retry(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut Vec<WireFrame>,
    keep: bool,
    delay: Duration,
    auto_retry: bool,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep, if auto_retry => return true,
            cmd = commands.recv() => match cmd {
                Some(Command::Emit(frame)) => hold(frame, pending, keep),
                Some(Command::Reconnect) => return true,
                Some(Command::Close) | None => return false,
            },
        }
    }
}
