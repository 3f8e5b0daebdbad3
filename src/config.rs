//! Realtime configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::time::Duration;

use crate::domain::SessionScope;
use crate::error::RealtimeError;

/// Default backend realtime endpoint.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";

/// Top-level realtime configuration.
///
/// Loaded once at startup via [`RealtimeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Backend realtime endpoint (`ws://` or `wss://`).
    pub url: String,

    /// Delay before the full-reload trigger fires after credential expiry.
    pub reload_delay: Duration,

    /// Delay between WebSocket reconnect attempts.
    pub reconnect_delay: Duration,

    /// Bearer token, if supplied through the environment.
    pub token: Option<String>,

    /// Tenant identifier, if supplied through the environment.
    pub tenant_id: Option<String>,

    /// User identifier, if supplied through the environment.
    pub user_id: Option<String>,

    /// Topics the probe binary joins after connecting.
    pub topics: Vec<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reload_delay: Duration::from_millis(1_000),
            reconnect_delay: Duration::from_millis(2_000),
            token: None,
            tenant_id: None,
            user_id: None,
            topics: Vec::new(),
        }
    }
}

impl RealtimeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `REALTIME_URL` is set to a
    /// value that is not a `ws://` or `wss://` URL.
    pub fn from_env() -> Result<Self, RealtimeError> {
        dotenvy::dotenv().ok();

        let url = std::env::var("REALTIME_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        validate_url(&url)?;

        let reload_delay = Duration::from_millis(parse_env("REALTIME_RELOAD_DELAY_MS", 1_000));
        let reconnect_delay =
            Duration::from_millis(parse_env("REALTIME_RECONNECT_DELAY_MS", 2_000));

        let topics = std::env::var("REALTIME_TOPICS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();

        Ok(Self {
            url,
            reload_delay,
            reconnect_delay,
            token: non_empty_env("REALTIME_TOKEN"),
            tenant_id: non_empty_env("REALTIME_TENANT_ID"),
            user_id: non_empty_env("REALTIME_USER_ID"),
            topics,
        })
    }

    /// Returns the configured session scope, if both identifiers are set.
    #[must_use]
    pub fn scope(&self) -> Option<SessionScope> {
        match (&self.tenant_id, &self.user_id) {
            (Some(tenant), Some(user)) => Some(SessionScope::new(tenant, user)),
            _ => None,
        }
    }
}

/// Checks that `url` uses a WebSocket scheme.
///
/// # Errors
///
/// Returns [`RealtimeError::Config`] for any other scheme.
pub fn validate_url(url: &str) -> Result<(), RealtimeError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(RealtimeError::Config(format!(
            "REALTIME_URL must start with ws:// or wss://, got {url:?}"
        )))
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Reads an environment variable, treating blank values as unset.
fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Splits a comma-separated list, dropping blank entries.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
