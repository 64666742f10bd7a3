//! Domain layer: value objects, entities, and the collaborator traits the
//! real-time core depends on.

pub mod entity;
pub mod error;
pub mod identity;
pub mod presence;
pub mod repository;
pub mod value_object;

pub use entity::{Message, MessageKind, PresenceRecord, PresenceState};
pub use error::{HistoryError, IdentityError, RealtimeError, ValidationError};
pub use identity::{ConnectRequest, IdentityResolver};
pub use presence::{PresenceDiff, derive_online_users, diff_presence};
pub use repository::HistoryRepository;
pub use value_object::{ConnectionId, RoomId, Sequence, Timestamp, UserId};

#[cfg(test)]
pub use repository::MockHistoryRepository;
