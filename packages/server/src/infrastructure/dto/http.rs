//! HTTP API response DTOs.

use hiroba_shared::protocol::MessageFrame;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummaryDto {
    pub id: String,
    pub members: usize,
    pub sequence: u64,
    pub explicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    pub connection_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceDto {
    pub user_id: String,
    pub online: bool,
    /// RFC 3339 (JST)
    pub changed_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDetailDto {
    pub id: String,
    pub sequence: u64,
    pub members: Vec<MemberDto>,
    pub presence: Vec<PresenceDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDto {
    pub room: String,
    pub messages: Vec<MessageFrame>,
}
