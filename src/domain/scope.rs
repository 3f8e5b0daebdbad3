//! Session scope value object.
//!
//! [`SessionScope`] identifies which physical connection is valid: one
//! `(tenant, user)` pair per live connection. Identifiers are
//! string-normalized so that `7` and `"7"` name the same tenant.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The `(tenant, user)` pair a realtime connection is bound to.
///
/// Immutable once built. Two scopes are equal iff both normalized
/// identifiers match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScope {
    tenant_id: String,
    user_id: String,
}

impl SessionScope {
    /// Creates a scope from any displayable identifiers.
    ///
    /// Surrounding whitespace is trimmed.
    #[must_use]
    pub fn new(tenant_id: impl fmt::Display, user_id: impl fmt::Display) -> Self {
        Self {
            tenant_id: tenant_id.to_string().trim().to_string(),
            user_id: user_id.to_string().trim().to_string(),
        }
    }

    /// Returns the normalized tenant identifier.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the normalized user identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns `true` if both identifiers are non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.tenant_id.is_empty() && !self.user_id.is_empty()
    }
}

impl fmt::Display for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.user_id)
    }
}
