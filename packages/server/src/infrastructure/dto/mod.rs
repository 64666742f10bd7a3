//! Data Transfer Objects.
//!
//! - `http`: HTTP API response DTOs
//! - WebSocket frames live in `hiroba_shared::protocol` so the client can
//!   share them
//!
//! `conversion` holds the conversions from domain entities.

pub mod conversion;
pub mod http;
