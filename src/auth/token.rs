//! Bearer token inspection.
//!
//! Decodes the payload segment of a JWT-shaped bearer token to read its
//! `exp` claim. The signature is NOT verified; the backend does that. This
//! is only used to decide locally whether connecting is worth attempting.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::RealtimeError;

/// The only claim this layer cares about.
#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: Option<serde_json::Number>,
}

/// Returns the expiry timestamp carried by `token`.
///
/// Accepts an optional `Bearer ` prefix. Fractional `exp` values are
/// truncated to whole seconds.
///
/// # Errors
///
/// Returns [`RealtimeError::MalformedToken`] if the token has no payload
/// segment, the segment is not base64url JSON, or `exp` is missing or out
/// of range.
pub fn expiry_of(token: &str) -> Result<DateTime<Utc>, RealtimeError> {
    let token = token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();

    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_), Some(payload)) if !payload.is_empty() => payload,
        _ => {
            return Err(RealtimeError::MalformedToken(
                "missing payload segment".to_string(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| RealtimeError::MalformedToken(format!("payload is not base64url: {e}")))?;

    let claim: ExpiryClaim = serde_json::from_slice(&bytes)
        .map_err(|e| RealtimeError::MalformedToken(format!("payload is not JSON: {e}")))?;

    let exp = claim
        .exp
        .ok_or_else(|| RealtimeError::MalformedToken("missing exp claim".to_string()))?;
    let secs = exp
        .as_i64()
        .or_else(|| exp.as_f64().map(|f| f.trunc() as i64))
        .ok_or_else(|| RealtimeError::MalformedToken(format!("exp is not numeric: {exp}")))?;

    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| RealtimeError::MalformedToken(format!("exp out of range: {secs}")))
}

/// Returns `true` if `token` has expired at `now`.
///
/// # Errors
///
/// Propagates [`expiry_of`] failures.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> Result<bool, RealtimeError> {
    Ok(expiry_of(token)? <= now)
}
