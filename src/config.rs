//! Configuration and limits for client connections.

use std::time::Duration;

use crate::error::{Error, Result};

/// Size caps enforced on everything the client reads or writes.
///
/// A peer that exceeds them gets its session ended rather than an
/// allocation of the size it announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Largest payload accepted in one inbound frame. Default: 16 MiB.
    pub max_frame_size: usize,

    /// Largest text message delivered or sent. Default: 64 MiB.
    pub max_message_size: usize,

    /// Largest upgrade response head accepted from the server. Default: 8 KiB.
    pub max_handshake_size: usize,
}

const MIB: usize = 1024 * 1024;

impl Default for Limits {
    fn default() -> Self {
        Self::new(16 * MIB, 64 * MIB, 8 * 1024)
    }
}

impl Limits {
    #[must_use]
    pub const fn new(max_frame_size: usize, max_message_size: usize, max_handshake_size: usize) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_handshake_size,
        }
    }

    /// # Errors
    ///
    /// [`Error::FrameTooLarge`] when `size` is over `max_frame_size`.
    pub const fn check_frame_size(&self, size: usize) -> Result<()> {
        match over(size, self.max_frame_size) {
            Some(max) => Err(Error::FrameTooLarge { size, max }),
            None => Ok(()),
        }
    }

    /// # Errors
    ///
    /// [`Error::MessageTooLarge`] when `size` is over `max_message_size`.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        match over(size, self.max_message_size) {
            Some(max) => Err(Error::MessageTooLarge { size, max }),
            None => Ok(()),
        }
    }

    /// # Errors
    ///
    /// [`Error::HandshakeTooLarge`] when `size` is over `max_handshake_size`.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        match over(size, self.max_handshake_size) {
            Some(max) => Err(Error::HandshakeTooLarge { size, max }),
            None => Ok(()),
        }
    }
}

const fn over(size: usize, max: usize) -> Option<usize> {
    if size > max { Some(max) } else { None }
}

/// Deadlines applied at each stage of the connection lifecycle.
///
/// The connect deadline covers only the transport connect. Once the socket
/// is connected it no longer applies; the handshake deadline takes over, and
/// after the handshake only `idle` (if set) bounds the open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Transport connect timeout.
    ///
    /// Default: 5 seconds
    pub connect: Duration,

    /// Maximum time to complete the upgrade handshake.
    ///
    /// Default: 30 seconds
    pub handshake: Duration,

    /// Maximum time to wait for the peer to acknowledge a close.
    ///
    /// Default: 30 seconds
    pub close: Duration,

    /// Maximum time the open session may go without inbound traffic.
    ///
    /// Default: None (never expires)
    pub idle: Option<Duration>,

    /// Send a ping once half of the idle window has elapsed.
    ///
    /// Has no effect unless `idle` is set.
    /// Default: false
    pub keep_alive_pings: bool,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            handshake: Duration::from_secs(30),
            close: Duration::from_secs(30),
            idle: None,
            keep_alive_pings: false,
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values and no idle limit.
    #[must_use]
    pub const fn new(connect: Duration, handshake: Duration, close: Duration) -> Self {
        Self {
            connect,
            handshake,
            close,
            idle: None,
            keep_alive_pings: false,
        }
    }

    /// Bound the open session by an idle timeout, optionally with keep-alive pings.
    #[must_use]
    pub const fn with_idle(mut self, idle: Duration, keep_alive_pings: bool) -> Self {
        self.idle = Some(idle);
        self.keep_alive_pings = keep_alive_pings;
        self
    }
}

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Lifecycle deadlines.
    pub timeouts: Timeouts,

    /// Initial read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Initial write buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub write_buffer_size: usize,

    /// Number of commands (sends and closes) that may wait for the lane.
    ///
    /// A send submitted while the queue is full fails immediately.
    /// Default: 64
    pub send_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            send_queue_capacity: 64,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the transport connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set write buffer size.
    #[must_use]
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set the send queue capacity. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity.max(1);
        self
    }
}
