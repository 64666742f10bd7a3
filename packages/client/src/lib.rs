//! Terminal client for the Hiroba rooms server.
//!
//! Lines typed at the prompt are parsed into commands (`/join`, `/history`,
//! ...) or chat text for the current room. After a dropped connection the
//! client reconnects, rejoins its rooms and replays what it missed,
//! deduplicating by `(room, sequence)`.

pub mod command;
pub mod domain;
pub mod error;
pub mod formatter;
mod runner;
mod session;
pub mod state;
pub mod tracker;
mod ui;

pub use runner::run_client;
