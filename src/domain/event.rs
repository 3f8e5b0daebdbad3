//! Event vocabulary shared by the registry, the connections and transports.
//!
//! The reserved names in this module are part of the public wire contract:
//! joins go out as `join<Topic>`, leaves as `leave<Topic>`, and the server
//! signals handshake completion with a `ready` event.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// App-level handshake event sent by the server once session state is initialized.
pub const READY_EVENT: &str = "ready";

/// Transport-connect pseudo-event. Consumers registering for it are
/// normalized to [`READY_EVENT`].
pub const CONNECT_EVENT: &str = "connect";

/// Event-name prefix of a subscribe request.
pub const JOIN_PREFIX: &str = "join";

/// Event-name prefix of an unsubscribe request.
pub const LEAVE_PREFIX: &str = "leave";

/// Returns `true` for the event names that mean "the connection is usable".
#[must_use]
pub fn is_ready_alias(event: &str) -> bool {
    event == READY_EVENT || event == CONNECT_EVENT
}

/// Outbound operation, decided at the call site.
///
/// Only [`Outbound::Subscribe`] is tracked for replay after a reconnect.
/// On the wire both variants are plain named events.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Join a server-side topic (room).
    Subscribe {
        /// Topic name without the `join` prefix.
        topic: String,
        /// Join parameters.
        params: Value,
    },
    /// Fire-and-forget event.
    Publish {
        /// Wire event name.
        event: String,
        /// Event payload.
        payload: Value,
    },
}

impl Outbound {
    /// Builds a subscribe operation for `topic`.
    #[must_use]
    pub fn subscribe(topic: impl Into<String>, params: Value) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            params,
        }
    }

    /// Builds a publish operation for `event`.
    #[must_use]
    pub fn publish(event: impl Into<String>, payload: Value) -> Self {
        Self::Publish {
            event: event.into(),
            payload,
        }
    }

    /// Classifies a legacy prefixed event name.
    ///
    /// `joinChat` becomes `Subscribe { topic: "Chat" }`; anything else,
    /// including a bare `join`, is a publish.
    #[must_use]
    pub fn from_event_name(event: &str, payload: Value) -> Self {
        match event.strip_prefix(JOIN_PREFIX) {
            Some(topic) if !topic.is_empty() => Self::subscribe(topic, payload),
            _ => Self::publish(event, payload),
        }
    }

    /// Returns the event name sent on the wire.
    #[must_use]
    pub fn wire_name(&self) -> String {
        match self {
            Self::Subscribe { topic, .. } => format!("{JOIN_PREFIX}{topic}"),
            Self::Publish { event, .. } => event.clone(),
        }
    }

    /// Returns the payload sent on the wire.
    #[must_use]
    pub fn payload(&self) -> &Value {
        match self {
            Self::Subscribe { params, .. } => params,
            Self::Publish { payload, .. } => payload,
        }
    }
}

/// Why a transport connection went away.
///
/// Mirrors the reasons reported by socket-style transports. Only
/// [`DisconnectReason::ClientDisconnect`] is application-initiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the connection. Transports do not retry this on their own.
    ServerDisconnect,
    /// The application closed the connection.
    ClientDisconnect,
    /// Heartbeat timed out.
    PingTimeout,
    /// The underlying stream ended.
    TransportClose,
    /// The underlying stream failed.
    TransportError,
    /// Any other reason reported by the transport.
    Other(String),
}

impl DisconnectReason {
    /// Parses a transport reason string.
    #[must_use]
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "io server disconnect" => Self::ServerDisconnect,
            "io client disconnect" => Self::ClientDisconnect,
            "ping timeout" => Self::PingTimeout,
            "transport close" => Self::TransportClose,
            "transport error" => Self::TransportError,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the transport reason string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerDisconnect => "io server disconnect",
            Self::ClientDisconnect => "io client disconnect",
            Self::PingTimeout => "ping timeout",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::Other(reason) => reason.as_str(),
        }
    }

    /// Returns `true` if the application itself closed the connection.
    #[must_use]
    pub fn is_client_initiated(&self) -> bool {
        matches!(self, Self::ClientDisconnect)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound activity reported by a transport, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport (re)connected.
    Connected {
        /// `true` if the transport resumed the previous server session,
        /// in which case server-side room membership survived.
        recovered: bool,
    },
    /// A connection attempt failed.
    ConnectError(String),
    /// The transport disconnected.
    Disconnected(DisconnectReason),
    /// A server-pushed event, including the `ready` handshake.
    Message {
        /// Event name.
        event: String,
        /// Event payload.
        payload: Value,
    },
}

/// Connectivity of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connecting or reconnecting.
    Connecting,
    /// Connected.
    Open,
    /// Torn down. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}
