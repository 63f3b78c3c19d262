//! Lifecycle phases of a client connection.

/// Phase of a [`ClientConnection`](crate::ClientConnection).
///
/// ```text
/// Idle -> Resolving -> Connecting -> Handshaking -> Open -> Closing -> Closed
///             \             \             \          \
///              +-------------+-------------+----------+--> Failed
/// ```
///
/// A close requested before `Open` goes straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionPhase {
    /// Created, `connect` not called yet.
    #[default]
    Idle,
    /// Looking up the host.
    Resolving,
    /// Transport connect in progress.
    Connecting,
    /// Upgrade request sent, waiting for the response.
    Handshaking,
    /// Messages can be sent and received.
    Open,
    /// Close frame sent, waiting for the peer.
    Closing,
    /// Closed by the user, or after the peer went away while open.
    Closed,
    /// The connection could not be established.
    Failed,
}

impl ConnectionPhase {
    /// Returns `true` only for `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(self) -> bool {
        matches!(self, ConnectionPhase::Open)
    }

    /// Returns `true` while the connection is being established.
    #[must_use]
    #[inline]
    pub const fn is_establishing(self) -> bool {
        matches!(
            self,
            ConnectionPhase::Resolving | ConnectionPhase::Connecting | ConnectionPhase::Handshaking
        )
    }

    /// Returns `true` for `Closed` and `Failed`.
    #[must_use]
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ConnectionPhase::Closed | ConnectionPhase::Failed)
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionPhase::Idle => "Idle",
            ConnectionPhase::Resolving => "Resolving",
            ConnectionPhase::Connecting => "Connecting",
            ConnectionPhase::Handshaking => "Handshaking",
            ConnectionPhase::Open => "Open",
            ConnectionPhase::Closing => "Closing",
            ConnectionPhase::Closed => "Closed",
            ConnectionPhase::Failed => "Failed",
        };
        f.write_str(name)
    }
}
