//! UI layer: the WebSocket protocol adapter and the HTTP API.

pub mod event_handler;
mod handler;
mod server;
mod signal;
pub mod state;

pub use event_handler::{EventHandler, RoomEventHandler, Session};
pub use server::Server;
pub use signal::shutdown_signal;
