//! No-op connection handed out when there is no usable session.

use super::Connection;
use crate::domain::{EventHandler, Outbound};

/// Connection that performs no I/O.
///
/// Lets features call the connection API unconditionally while signed
/// out or after the credential expired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConnection;

impl Connection for NullConnection {
    fn on(&self, _event: &str, _handler: EventHandler) {}

    fn off(&self, _event: &str, _handler: &EventHandler) {}

    fn emit(&self, _op: Outbound) {}

    fn dispose(&mut self) {}
}
