//! WebSocket wire protocol.
//!
//! Every frame is a JSON text frame tagged by `type`. Client frames are
//! commands; server frames are replies and room events. Message frames carry
//! `(room, sequence)`, which receivers use to deduplicate live deliveries
//! against history replay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    Join {
        room: String,
    },
    Leave {
        room: String,
    },
    Publish {
        room: String,
        payload: Value,
    },
    /// Request history after `since` (exclusive)
    History {
        room: String,
        #[serde(default)]
        since: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    Members {
        room: String,
    },
    Presence {
        room: String,
    },
    Ping,
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    Connected {
        connection_id: String,
        user_id: String,
    },
    Joined {
        room: String,
        sequence_at_join: u64,
    },
    Left {
        room: String,
    },
    Message(MessageFrame),
    Published {
        room: String,
        sequence: u64,
    },
    History {
        room: String,
        messages: Vec<MessageFrame>,
    },
    Members {
        room: String,
        members: Vec<MemberFrame>,
    },
    Presence {
        room: String,
        users: Vec<PresenceFrame>,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

/// Kind of a room message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKindFrame {
    Chat,
    Presence,
}

/// A sequenced room message, live or replayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFrame {
    pub room: String,
    pub sequence: u64,
    pub sender: String,
    pub kind: MessageKindFrame,
    pub payload: Value,
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberFrame {
    pub connection_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceFrame {
    pub user_id: String,
    pub online: bool,
    /// Unix timestamp (milliseconds) of the last transition
    pub changed_at: i64,
}
