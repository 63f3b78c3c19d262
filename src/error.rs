//! Error types for the WebSocket client.
//!
//! Every failure the client can report is a variant of [`Error`]. Variants are
//! grouped into an [`ErrorCategory`] matching the stage of the lifecycle that
//! produced them, so callers can tell a name-lookup failure from a rejected
//! handshake, or a peer teardown from a protocol violation on read.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionPhase;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a client connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Name resolution failed or returned no addresses.
    #[error("Resolve failed for {host}:{port}: {reason}")]
    Resolve {
        /// Host that was looked up.
        host: String,
        /// Port that was looked up.
        port: u16,
        /// Human-readable cause.
        reason: String,
    },

    /// Endpoint URL could not be parsed or uses an unsupported scheme.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Transport connect failed.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Transport connect did not finish within the connect timeout.
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake response exceeded the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Header value contains characters that would break the request.
    #[error("Invalid header value for {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Handshake did not finish within the handshake timeout.
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The connection was torn down by the peer (close frame or end of stream).
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// A pending operation was abandoned because the connection was shut down locally.
    #[error("Operation aborted")]
    Aborted,

    /// No traffic from the peer within the idle timeout.
    #[error("Idle timeout after {0:?}")]
    IdleTimeout(Duration),

    /// The peer did not acknowledge a close within the close timeout.
    #[error("Close timed out after {0:?}")]
    CloseTimeout(Duration),

    /// I/O error occurred.
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        /// Kind of the underlying I/O error.
        kind: io::ErrorKind,
        /// Message of the underlying I/O error.
        message: String,
    },

    /// The operation is not valid in the current phase.
    #[error("Connection not open (phase: {0})")]
    NotOpen(ConnectionPhase),

    /// `connect` was called on a connection that already left `Idle`.
    #[error("Connection already started (phase: {0})")]
    AlreadyStarted(ConnectionPhase),

    /// The outbound queue is full.
    #[error("Send queue full (capacity: {0})")]
    SendQueueFull(usize),

    /// The peer sent a data frame type this client does not handle.
    #[error("Unsupported data frame: {0}")]
    UnsupportedData(String),

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Declared payload length does not fit in memory on this platform.
    #[error("Payload too large for platform: {size} bytes (max: {max})")]
    PayloadTooLargeForPlatform {
        /// Declared payload length.
        size: u64,
        /// Largest addressable length.
        max: u64,
    },

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),
}

/// Lifecycle stage an [`Error`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Name lookup failure or an endpoint that cannot be looked up.
    Resolve,
    /// Transport connect failure, including timeout.
    Connect,
    /// Protocol upgrade failure.
    Handshake,
    /// The socket was torn down (peer close, end of stream, reset, local abort).
    Teardown,
    /// Any other failure on the read path (protocol violation, idle timeout, ...).
    Read,
    /// Write failure.
    Write,
    /// Close handshake failure.
    Close,
    /// Operation rejected by the state machine.
    State,
}

impl Error {
    /// Classify this error by lifecycle stage.
    ///
    /// Plain I/O errors are classified as [`ErrorCategory::Teardown`] when
    /// their kind means the socket is gone, and [`ErrorCategory::Read`]
    /// otherwise. Write failures are reported through the send callback, so
    /// the caller already knows which operation produced them.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Resolve { .. } | Error::InvalidUrl { .. } => ErrorCategory::Resolve,
            Error::Connect(_) | Error::ConnectTimeout(_) => ErrorCategory::Connect,
            Error::InvalidHandshake(_)
            | Error::HandshakeTooLarge { .. }
            | Error::InvalidHeaderValue { .. }
            | Error::HandshakeTimeout(_) => ErrorCategory::Handshake,
            Error::ConnectionClosed(_) | Error::Aborted => ErrorCategory::Teardown,
            Error::Io { kind, .. } if is_teardown_kind(*kind) => ErrorCategory::Teardown,
            Error::CloseTimeout(_) => ErrorCategory::Close,
            Error::NotOpen(_) | Error::AlreadyStarted(_) | Error::SendQueueFull(_) => {
                ErrorCategory::State
            }
            _ => ErrorCategory::Read,
        }
    }

    /// Returns `true` if this error means the socket was torn down.
    #[must_use]
    pub fn is_teardown(&self) -> bool {
        self.category() == ErrorCategory::Teardown
    }

    /// Close code to send to the peer when this error ends the session.
    pub(crate) fn close_code(&self) -> Option<u16> {
        match self {
            Error::InvalidUtf8 => Some(1007),
            Error::FrameTooLarge { .. } | Error::MessageTooLarge { .. } => Some(1009),
            Error::UnsupportedData(_) => Some(1003),
            Error::ProtocolViolation(_)
            | Error::InvalidFrame(_)
            | Error::ReservedOpcode(_)
            | Error::InvalidOpcode(_)
            | Error::FragmentedControlFrame
            | Error::ControlFrameTooLarge(_)
            | Error::MaskedServerFrame
            | Error::ReservedBitsSet
            | Error::InvalidCloseCode(_) => Some(1002),
            _ => None,
        }
    }
}

fn is_teardown_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
