//! Domain logic for client-side operations.
//!
//! This module contains pure functions that implement business logic
//! without side effects, making them easy to test.

use crate::error::ClientError;

/// Check if the client should exit immediately based on the error type.
///
/// Rejections that a retry cannot fix end the client.
pub fn should_exit_immediately(error: &ClientError) -> bool {
    matches!(
        error,
        ClientError::Unauthorized | ClientError::DuplicateSession(_)
    )
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `error` - The client error that occurred
/// * `current_attempt` - The current reconnection attempt count (0-indexed)
/// * `max_attempts` - The maximum number of reconnection attempts allowed
pub fn should_attempt_reconnect(
    error: &ClientError,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    if should_exit_immediately(error) {
        return false;
    }
    current_attempt < max_attempts
}

/// Failed attempts so far after a session ends.
///
/// A session that reached the server starts the count over, so a client
/// that stays connected for long periods never runs out of attempts.
pub fn next_reconnect_count(current: u32, connected: bool) -> u32 {
    if connected { 1 } else { current + 1 }
}

/// Map a rejected WebSocket handshake to a client error
pub fn handshake_error(status: u16, user: &str) -> ClientError {
    match status {
        401 => ClientError::Unauthorized,
        409 => ClientError::DuplicateSession(user.to_string()),
        503 => ClientError::ServerFull,
        other => ClientError::ConnectionError(format!("handshake rejected with HTTP {}", other)),
    }
}
