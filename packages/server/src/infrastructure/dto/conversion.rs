//! Conversion logic between wire frames and domain entities.

use hiroba_shared::{
    protocol::{MemberFrame, MessageFrame, MessageKindFrame, PresenceFrame, ServerFrame},
    time::timestamp_to_jst_rfc3339,
};

use crate::{
    domain::{ConnectionId, Message, MessageKind, PresenceRecord, RealtimeError, UserId},
    infrastructure::{
        directory::RoomSummary,
        dto::http::{MemberDto, PresenceDto, RoomSummaryDto},
    },
    usecase::MemberInfo,
};

// ========================================
// Domain Entity → DTO
// ========================================

impl From<MessageKind> for MessageKindFrame {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Chat => Self::Chat,
            MessageKind::Presence => Self::Presence,
        }
    }
}

impl From<&Message> for MessageFrame {
    fn from(message: &Message) -> Self {
        Self {
            room: message.room.as_str().to_string(),
            sequence: message.sequence.value(),
            sender: message.sender.as_str().to_string(),
            kind: message.kind.into(),
            payload: message.payload.clone(),
            timestamp: message.timestamp.value(),
        }
    }
}

impl From<&PresenceRecord> for PresenceFrame {
    fn from(record: &PresenceRecord) -> Self {
        Self {
            user_id: record.user.as_str().to_string(),
            online: record.is_online(),
            changed_at: record.changed_at.value(),
        }
    }
}

impl From<&RealtimeError> for ServerFrame {
    fn from(err: &RealtimeError) -> Self {
        ServerFrame::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

pub fn member_frame(connection: ConnectionId, user: &UserId) -> MemberFrame {
    MemberFrame {
        connection_id: connection.to_string(),
        user_id: user.as_str().to_string(),
    }
}

impl From<&RoomSummary> for RoomSummaryDto {
    fn from(summary: &RoomSummary) -> Self {
        Self {
            id: summary.room.as_str().to_string(),
            members: summary.members,
            sequence: summary.sequence.value(),
            explicit: summary.explicit,
        }
    }
}

impl From<&MemberInfo> for MemberDto {
    fn from(member: &MemberInfo) -> Self {
        Self {
            connection_id: member.connection_id.to_string(),
            user_id: member.user_id.as_str().to_string(),
        }
    }
}

impl From<&PresenceRecord> for PresenceDto {
    fn from(record: &PresenceRecord) -> Self {
        Self {
            user_id: record.user.as_str().to_string(),
            online: record.is_online(),
            changed_at: timestamp_to_jst_rfc3339(record.changed_at.value()),
        }
    }
}
