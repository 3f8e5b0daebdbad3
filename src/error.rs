//! Realtime layer error types.
//!
//! [`RealtimeError`] is the central error type for the crate. None of these
//! errors ever reach feature code through the connection API: the registry
//! logs them and degrades to a null connection or a full reload instead.
//! They surface only from the lower-level building blocks (credential
//! inspection, configuration, transport construction).

/// Error enum for the realtime connection layer.
///
/// # Kinds
///
/// | Variant             | Kind label      | Local remedy                  |
/// |---------------------|-----------------|-------------------------------|
/// | `MalformedToken`    | `credential`    | full reload                   |
/// | `MissingCredential` | `credential`    | null connection               |
/// | `InvalidUrl`        | `config`        | none (startup failure)        |
/// | `Config`            | `config`        | none (startup failure)        |
/// | `Transport`         | `transport`     | transport retry               |
/// | `WebSocket`         | `transport`     | transport retry               |
/// | `Serialization`     | `serialization` | frame dropped                 |
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// The bearer token could not be decoded or carries no expiry claim.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The credential store holds no bearer token.
    #[error("no credential available")]
    MissingCredential,

    /// The realtime endpoint URL is not a valid WebSocket URL.
    #[error("invalid realtime url: {0}")]
    InvalidUrl(String),

    /// Transport-level failure that is not a WebSocket protocol error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Error propagated from the WebSocket protocol stack.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A wire frame could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration value is present but unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RealtimeError {
    /// Returns a stable, low-cardinality label for structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) | Self::MissingCredential => "credential",
            Self::InvalidUrl(_) | Self::Config(_) => "config",
            Self::Transport(_) | Self::WebSocket(_) => "transport",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Returns `true` if the error means the session cannot be recovered
    /// without re-authenticating.
    #[must_use]
    pub const fn requires_reload(&self) -> bool {
        matches!(self, Self::MalformedToken(_))
    }
}
