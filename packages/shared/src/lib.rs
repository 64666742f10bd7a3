//! Shared building blocks for the Hiroba server and client.
//!
//! - `logger`: tracing subscriber setup
//! - `time`: clock abstraction and timestamp formatting
//! - `protocol`: JSON frames exchanged over the WebSocket

pub mod logger;
pub mod protocol;
pub mod time;
