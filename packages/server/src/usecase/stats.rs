//! UseCase: 統計情報の取得

use std::sync::Arc;

use serde::Serialize;

use crate::infrastructure::{
    directory::{RoomDirectory, RoomSummary},
    registry::ConnectionRegistry,
};

/// Point-in-time view of the real-time core
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connections: usize,
    pub rooms: Vec<RoomSummary>,
    /// Messages discarded by the drop-oldest policy since startup
    pub dropped_messages: u64,
    /// Connections closed by the disconnect policy since startup
    pub evicted_connections: u64,
}

/// 統計情報取得のユースケース
pub struct GetStatsUseCase {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
}

impl GetStatsUseCase {
    pub fn new(registry: Arc<ConnectionRegistry>, directory: Arc<RoomDirectory>) -> Self {
        Self {
            registry,
            directory,
        }
    }

    pub fn execute(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.registry.count(),
            rooms: self.directory.summaries(),
            dropped_messages: self.registry.dropped_total(),
            evicted_connections: self.registry.evicted_total(),
        }
    }
}
