//! WebSocket session loop.
//!
//! Handles the read/write loop for one established socket: inbound text
//! frames become [`TransportEvent::Message`]s, outbound commands become
//! text frames. Returns when either side ends the session.

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use super::messages::WireFrame;
use crate::domain::{DisconnectReason, TransportEvent};
use crate::transport::EventSender;

/// Instruction from a [`super::WsTransport`] handle to its task.
#[derive(Debug)]
pub(crate) enum Command {
    Emit(WireFrame),
    Reconnect,
    Close,
}

/// How a session ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The application closed the transport.
    Closed,
    /// The link went away.
    Dropped(DisconnectReason),
}

/// Runs the read/write loop for a single socket.
///
/// `pending` frames queued before the socket existed are sent first.
pub(crate) async fn run_session<S>(
    socket: WebSocketStream<S>,
    pending: Vec<WireFrame>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &EventSender,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = socket.split();

    for frame in pending {
        if !send_frame(&mut ws_tx, &frame).await {
            return SessionEnd::Dropped(DisconnectReason::TransportError);
        }
    }

    loop {
        tokio::select! {
            // Incoming frame from the server
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => forward_frame(text.as_str(), events),
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Dropped(DisconnectReason::ServerDisconnect);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::warn!(%error, "websocket read failed");
                        return SessionEnd::Dropped(DisconnectReason::TransportError);
                    }
                    None => return SessionEnd::Dropped(DisconnectReason::TransportClose),
                }
            }
            // Command from the transport handle
            cmd = commands.recv() => {
                match cmd {
                    Some(Command::Emit(frame)) => {
                        if !send_frame(&mut ws_tx, &frame).await {
                            return SessionEnd::Dropped(DisconnectReason::TransportError);
                        }
                    }
                    Some(Command::Reconnect) => {}
                    Some(Command::Close) | None => {
                        let _ = ws_tx.close().await;
                        return SessionEnd::Closed;
                    }
                }
            }
        }
    }
}

/// Encodes and sends one frame. Returns `false` if the socket is gone.
async fn send_frame<W>(ws_tx: &mut W, frame: &WireFrame) -> bool
where
    W: Sink<Message> + Unpin,
{
    let json = match frame.to_json() {
        Ok(json) => json,
        Err(error) => {
            tracing::warn!(event = %frame.event, %error, "dropping unencodable frame");
            return true;
        }
    };
    ws_tx.send(Message::text(json)).await.is_ok()
}

/// Parses an inbound text frame and hands it to the lifecycle driver.
fn forward_frame(text: &str, events: &EventSender) {
    match WireFrame::parse(text) {
        Ok(frame) => {
            let _ = events.send(TransportEvent::Message {
                event: frame.event,
                payload: frame.payload,
            });
        }
        Err(error) => tracing::warn!(%error, "malformed frame from server"),
    }
}
