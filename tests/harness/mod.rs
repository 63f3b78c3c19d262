//! Test harness for client lifecycle tests.
//!
//! A loopback WebSocket server with scripted behaviors, plus recorders for
//! callbacks and sink events.

#![allow(dead_code)]

mod recorder;
mod server;

pub use recorder::{Event, Recorder, RecordingSink};
pub use server::{Behavior, TestServer};
