//! WebSocket wire frame.
//!
//! Every text frame in either direction is one JSON object:
//!
//! ```json
//! { "event": "joinChat", "payload": { "chatId": 42 }, "timestamp": "2026-01-01T00:00:00Z" }
//! ```
//!
//! `payload` defaults to `null` and `timestamp` is optional on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RealtimeError;

/// One named event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Value,
    /// ISO-8601 send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WireFrame {
    /// Builds an outbound frame stamped with the current time.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            timestamp: Some(Utc::now()),
        }
    }

    /// Parses an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Serialization`] if `text` is not a frame.
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encodes the frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }
}
