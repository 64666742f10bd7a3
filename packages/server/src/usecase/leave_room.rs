//! UseCase: ルーム退出

use std::sync::Arc;

use crate::{
    domain::{ConnectionId, RoomId},
    infrastructure::directory::RoomDirectory,
};

use super::presence::PresenceTracker;

/// ルーム退出のユースケース
pub struct LeaveRoomUseCase {
    directory: Arc<RoomDirectory>,
    presence: Arc<PresenceTracker>,
}

impl LeaveRoomUseCase {
    pub fn new(directory: Arc<RoomDirectory>, presence: Arc<PresenceTracker>) -> Self {
        Self {
            directory,
            presence,
        }
    }

    /// 退出を実行。所属していた場合は `true`
    pub async fn execute(&self, connection: ConnectionId, room: &RoomId) -> bool {
        let was_member = self.directory.leave(connection, room);
        if was_member {
            self.presence.refresh(room).await;
        }
        was_member
    }
}
