//! HTTP and WebSocket handlers.

mod http;
mod websocket;

use axum::http::StatusCode;

use crate::domain::RealtimeError;

pub use http::{get_room_detail, get_room_history, get_rooms, get_stats, health_check};
pub use websocket::websocket_handler;

/// HTTP status for an error returned before or outside a WebSocket session
pub(crate) fn status_for(err: &RealtimeError) -> StatusCode {
    match err {
        RealtimeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        RealtimeError::DuplicateSession(_) => StatusCode::CONFLICT,
        RealtimeError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RealtimeError::InvalidInput(_) | RealtimeError::ProtocolViolation(_) => {
            StatusCode::BAD_REQUEST
        }
        RealtimeError::RoomNotFound(_) | RealtimeError::ConnectionGone(_) => StatusCode::NOT_FOUND,
        RealtimeError::HistoryTruncated { .. } => StatusCode::GONE,
        RealtimeError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
