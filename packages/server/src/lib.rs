//! Hiroba real-time core.
//!
//! Accepts long-lived WebSocket connections, organizes them into rooms,
//! tracks presence, and fans out room messages with a per-room total order
//! and history replay.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
