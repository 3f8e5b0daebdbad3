//! Credential access: token expiry inspection and the read-only store.

pub mod store;
pub mod token;

pub use store::{CredentialStore, MemoryCredentialStore};
pub use token::{expiry_of, is_expired};
