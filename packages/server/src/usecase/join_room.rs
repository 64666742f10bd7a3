//! UseCase: ルーム参加
//!
//! Room Directory に所属を追加し、新規参加ならプレゼンスを再計算します。
//! 返される `sequence_at_join` より後のメッセージはライブで届き、
//! それ以前のメッセージは History から取得できます。

use std::sync::Arc;

use crate::{
    domain::{ConnectionId, RealtimeError, RoomId},
    infrastructure::{
        directory::{JoinResult, RoomDirectory},
        registry::ConnectionRegistry,
    },
};

use super::presence::PresenceTracker;

/// ルーム参加のユースケース
pub struct JoinRoomUseCase {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
    presence: Arc<PresenceTracker>,
}

impl JoinRoomUseCase {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<RoomDirectory>,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        Self {
            registry,
            directory,
            presence,
        }
    }

    /// 参加を実行
    ///
    /// * `Err(ConnectionGone)` - コネクションがすでに削除されている
    /// * `Err(RoomNotFound)` - 暗黙のルーム作成が無効で、ルームが存在しない
    pub async fn execute(
        &self,
        connection: ConnectionId,
        room: &RoomId,
    ) -> Result<JoinResult, RealtimeError> {
        if self.registry.owner_of(connection).is_none() {
            return Err(RealtimeError::ConnectionGone(connection));
        }
        let result = self.directory.join(connection, room).await?;
        if result.newly_joined {
            self.presence.refresh(room).await;
        }
        Ok(result)
    }
}
