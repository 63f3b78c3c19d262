//! Structured event reporting.
//!
//! The connection lane reports phase transitions and failures through an
//! [`EventSink`]. Failures are reported before the callback for the failed
//! operation runs. [`TracingSink`] is the default and emits `tracing` events;
//! the library never installs a subscriber itself.

use std::fmt;

use crate::connection::ConnectionPhase;
use crate::endpoint::Endpoint;
use crate::error::Error;

/// Lifecycle operation a reported failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Resolve,
    Connect,
    Handshake,
    Read,
    Write,
    Close,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Resolve => "resolve",
            Operation::Connect => "connect",
            Operation::Handshake => "handshake",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Close => "close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of connection events.
///
/// Called from the connection's lane; implementations must not block.
pub trait EventSink: Send + Sync + 'static {
    /// The connection moved from `from` to `to`.
    fn phase_changed(&self, endpoint: &Endpoint, from: ConnectionPhase, to: ConnectionPhase);

    /// `operation` failed with `error`.
    fn failed(&self, endpoint: &Endpoint, operation: Operation, error: &Error);
}

/// [`EventSink`] that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn phase_changed(&self, endpoint: &Endpoint, from: ConnectionPhase, to: ConnectionPhase) {
        tracing::debug!(
            host = endpoint.host(),
            port = endpoint.port(),
            %from,
            %to,
            "Connection phase changed"
        );
    }

    fn failed(&self, endpoint: &Endpoint, operation: Operation, error: &Error) {
        if error.is_teardown() {
            tracing::info!(
                operation = operation.as_str(),
                host = endpoint.host(),
                port = endpoint.port(),
                error = %error,
                "Connection torn down"
            );
        } else {
            tracing::warn!(
                operation = operation.as_str(),
                host = endpoint.host(),
                port = endpoint.port(),
                error = %error,
                category = ?error.category(),
                "Operation failed"
            );
        }
    }
}
