//! Domain-level errors.

use thiserror::Error;

use super::{ConnectionId, RoomId, Sequence, UserId};

/// Value object validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} contains invalid character {ch:?}")]
    InvalidCharacter { field: &'static str, ch: char },
}

/// Errors reported by a history store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// Underlying storage failed
    #[error("history storage error: {0}")]
    Storage(String),

    /// Append did not continue the room's sequence
    #[error("sequence conflict in room '{room}': expected {expected}, got {actual}")]
    SequenceConflict {
        room: String,
        expected: u64,
        actual: u64,
    },
}

/// Errors reported by an identity resolver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("missing credentials")]
    MissingToken,

    #[error("credentials rejected: {0}")]
    Rejected(String),
}

/// Errors returned by the real-time application API.
///
/// Resource and not-found errors go back to the immediate caller;
/// `PersistenceFailure` aborts one publish; `ProtocolViolation` removes one
/// connection. None of them stop the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    #[error("connection limit of {limit} reached")]
    CapacityExceeded { limit: usize },

    #[error("user '{0}' already holds a session")]
    DuplicateSession(UserId),

    #[error("connection {0} is gone")]
    ConnectionGone(ConnectionId),

    #[error("room '{0}' not found")]
    RoomNotFound(RoomId),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("history of room '{room}' is truncated: expected sequence {expected}, oldest available {available}")]
    HistoryTruncated {
        room: RoomId,
        expected: Sequence,
        available: Sequence,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
}

impl RealtimeError {
    /// Stable identifier sent to clients in error frames
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "capacity-exceeded",
            Self::DuplicateSession(_) => "duplicate-session",
            Self::ConnectionGone(_) => "connection-gone",
            Self::RoomNotFound(_) => "room-not-found",
            Self::PersistenceFailure(_) => "persistence-failure",
            Self::HistoryTruncated { .. } => "history-truncated",
            Self::ProtocolViolation(_) => "protocol-violation",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidInput(_) => "invalid-input",
        }
    }
}

impl From<HistoryError> for RealtimeError {
    fn from(err: HistoryError) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl From<IdentityError> for RealtimeError {
    fn from(err: IdentityError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}
