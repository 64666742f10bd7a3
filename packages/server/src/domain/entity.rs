//! Entities: messages and presence records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value_object::{RoomId, Sequence, Timestamp, UserId};

/// What a room message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// Application payload published by a client
    Chat,
    /// Presence transition emitted by the server
    Presence,
}

/// A sequenced room message.
///
/// Messages are built only by the broadcaster, after it has assigned the
/// sequence, and are never mutated afterwards. History entries are the same
/// value: a `Message` already carries its room id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub room: RoomId,
    pub sequence: Sequence,
    pub sender: UserId,
    pub kind: MessageKind,
    pub payload: Value,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn new(
        room: RoomId,
        sequence: Sequence,
        sender: UserId,
        kind: MessageKind,
        payload: Value,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            room,
            sequence,
            sender,
            kind,
            payload,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Derived presence of one user.
///
/// `rooms` lists the rooms in which the user is currently online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user: UserId,
    pub state: PresenceState,
    pub rooms: BTreeSet<RoomId>,
    pub changed_at: Timestamp,
}

impl PresenceRecord {
    pub fn is_online(&self) -> bool {
        self.state == PresenceState::Online
    }
}
