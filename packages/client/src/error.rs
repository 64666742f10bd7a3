//! Error types for the client.

use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The server rejected the token
    #[error("Token rejected by the server")]
    Unauthorized,

    /// The user already holds a session and the server allows only one
    #[error("User '{0}' is already connected")]
    DuplicateSession(String),

    /// The server is at its connection limit
    #[error("Server is full")]
    ServerFull,

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Errors from parsing a line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command '/{0}' (try /help)")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a sequence number")]
    InvalidSequence(String),
}
