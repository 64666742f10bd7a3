//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use hiroba_shared::protocol::MessageFrame;
use serde::Deserialize;

use crate::{
    domain::{RoomId, Sequence},
    infrastructure::dto::http::{
        HistoryDto, MemberDto, PresenceDto, RoomDetailDto, RoomSummaryDto,
    },
    ui::state::AppState,
    usecase::StatsSnapshot,
};

use super::status_for;

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Connection and room counters
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.hub.stats())
}

/// Get list of rooms
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let stats = state.hub.stats();
    Json(stats.rooms.iter().map(RoomSummaryDto::from).collect())
}

/// Get room detail by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailDto>, StatusCode> {
    let room = parse_room(room_id)?;
    let Some(sequence) = state.hub.room_sequence(&room) else {
        return Err(StatusCode::NOT_FOUND);
    };

    let members = state.hub.members(&room).map_err(|e| status_for(&e))?;
    let presence = state.hub.room_presence(&room);

    // Domain Model から DTO への変換
    Ok(Json(RoomDetailDto {
        id: room.into_string(),
        sequence: sequence.value(),
        members: members.iter().map(MemberDto::from).collect(),
        presence: presence.iter().map(PresenceDto::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub since: u64,
    pub limit: Option<usize>,
}

/// Get room history after `since`
pub async fn get_room_history(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryDto>, StatusCode> {
    let room = parse_room(room_id)?;
    let messages = state
        .hub
        .history_since(&room, Sequence::new(query.since), query.limit)
        .await
        .map_err(|e| {
            tracing::debug!("History request for '{}' failed: {}", room, e);
            status_for(&e)
        })?;

    Ok(Json(HistoryDto {
        room: room.into_string(),
        messages: messages.iter().map(MessageFrame::from).collect(),
    }))
}

fn parse_room(room_id: String) -> Result<RoomId, StatusCode> {
    RoomId::new(room_id).map_err(|e| {
        tracing::warn!("Invalid room id: {}", e);
        StatusCode::BAD_REQUEST
    })
}
