//! The client connection and its lifecycle.
//!
//! ## Connection Lifecycle
//!
//! 1. **Idle** - created, `connect` not called yet
//! 2. **Resolving / Connecting / Handshaking** - establishing the session
//! 3. **Open** - messages flow in both directions
//! 4. **Closing** - close frame sent, waiting for the peer
//! 5. **Closed** or **Failed** - terminal
//!
//! Each connection is driven by one task (its lane) that owns the socket.
//! [`ClientConnection`] only queues commands for that task, so its methods
//! never block and are safe to call from inside the callbacks.

mod callbacks;
mod client;
mod lane;
mod state;

pub use callbacks::{Callbacks, Completion};
pub use client::ClientConnection;
pub use state::ConnectionPhase;
