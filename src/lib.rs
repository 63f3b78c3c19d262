//! # wslane - single-connection WebSocket client
//!
//! `wslane` drives one WebSocket client connection through an explicit
//! lifecycle (Idle, Resolving, Connecting, Handshaking, Open, Closing, then
//! Closed or Failed) on a dedicated tokio task, and reports every outcome
//! through callbacks.
//!
//! ## Features
//!
//! - **Non-blocking handle**: `connect`, `send` and `close` take `&self` and return immediately
//! - **Ordered sends** through a bounded queue with explicit backpressure
//! - **RFC 6455 client role**: masked frames, ping/pong, close handshake
//! - **Categorized errors** so a peer teardown is never confused with a protocol failure
//! - **Structured events** through an injectable sink, `tracing` by default
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wslane::{Callbacks, ClientConnection, Endpoint};
//!
//! # fn demo(handle: tokio::runtime::Handle) -> wslane::Result<()> {
//! let client = ClientConnection::new(Endpoint::parse("ws://127.0.0.1:9001/")?, handle);
//! client.connect(
//!     Callbacks::new()
//!         .on_connect(|result| println!("connect: {result:?}"))
//!         .on_message(|message| println!("message: {message:?}"))
//!         .on_disconnect(|error| println!("disconnect: {error}")),
//! );
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod observe;
pub mod protocol;

pub use codec::WebSocketCodec;
pub use config::{Config, Limits, Timeouts};
pub use connection::{Callbacks, ClientConnection, Completion, ConnectionPhase};
pub use endpoint::Endpoint;
pub use error::{Error, ErrorCategory, Result};
pub use message::{CloseCode, CloseFrame};
pub use observe::{EventSink, Operation, TracingSink};
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
