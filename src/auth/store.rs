//! Credential store collaborator.
//!
//! The realtime layer only ever reads credentials: the bearer token for
//! the expiry check and connection metadata, and the `(tenant, user)` pair
//! for [`crate::registry::ConnectionRegistry::acquire_current`].

use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::domain::SessionScope;

/// Synchronous, read-only view of the signed-in session.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Returns the current bearer token, if signed in.
    fn token(&self) -> Option<String>;

    /// Returns the current `(tenant, user)` scope, if signed in.
    fn scope(&self) -> Option<SessionScope>;
}

#[derive(Debug, Default, Clone)]
struct StoredSession {
    token: Option<String>,
    scope: Option<SessionScope>,
}

/// In-memory credential store, written by the authentication layer.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: RwLock<StoredSession>,
}

impl MemoryCredentialStore {
    /// Creates an empty (signed-out) store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `token` for `scope`.
    #[must_use]
    pub fn signed_in(token: impl Into<String>, scope: SessionScope) -> Self {
        Self {
            session: RwLock::new(StoredSession {
                token: Some(token.into()),
                scope: Some(scope),
            }),
        }
    }

    /// Replaces the bearer token.
    pub fn set_token(&self, token: impl Into<String>) {
        self.write(|s| s.token = Some(token.into()));
    }

    /// Replaces the scope.
    pub fn set_scope(&self, scope: SessionScope) {
        self.write(|s| s.scope = Some(scope));
    }

    /// Forgets token and scope.
    pub fn clear(&self) {
        self.write(|s| *s = StoredSession::default());
    }

    fn write(&self, f: impl FnOnce(&mut StoredSession)) {
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }

    fn read(&self) -> StoredSession {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.read().token
    }

    fn scope(&self) -> Option<SessionScope> {
        self.read().scope
    }
}
