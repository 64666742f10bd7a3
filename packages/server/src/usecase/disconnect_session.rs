//! UseCase: コネクション切断
//!
//! ## 処理の流れ
//!
//! 1. Registry から削除（送信キューを閉じる）
//! 2. Room Directory から全ルームの所属を削除
//! 3. 抜けたルームごとにプレゼンスを再計算（必要なら offline を通知）
//!
//! どの段階も冪等なので、同じコネクションに対して何度呼んでも問題ありません。
//! クライアントの切断、トランスポートエラー、アイドルタイムアウト、遅いコンシューマの
//! 強制切断はすべてこのユースケースを通ります。

use std::{sync::Arc, time::Duration};

use crate::{
    domain::ConnectionId,
    infrastructure::{
        directory::RoomDirectory,
        registry::{ConnectionRegistry, RemovalReason},
    },
};

use super::presence::PresenceTracker;

/// コネクション切断のユースケース
pub struct DisconnectSessionUseCase {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
    presence: Arc<PresenceTracker>,
}

impl DisconnectSessionUseCase {
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

    /// 切断を実行
    ///
    /// Returns `true` if this call removed the connection, `false` if it was
    /// already gone.
    pub async fn execute(&self, connection: ConnectionId, reason: RemovalReason) -> bool {
        let removed = self.registry.remove(connection, reason).is_some();
        let rooms = self.directory.leave_all(connection);
        for room in &rooms {
            self.presence.refresh(room).await;
        }
        removed
    }

    /// Remove connections idle for longer than `idle_timeout`, and those the
    /// disconnect backpressure policy already closed.
    ///
    /// Returns the number of connections removed.
    pub async fn sweep_idle(&self, idle_timeout: Duration) -> usize {
        let mut removed = 0;
        for connection in self.registry.idle_connections(idle_timeout) {
            let reason = match self.registry.get(connection) {
                Some(handle) if !handle.is_live() => RemovalReason::SlowConsumer,
                _ => RemovalReason::Idle,
            };
            if self.execute(connection, reason).await {
                removed += 1;
            }
        }
        let pruned = self.presence.prune();
        if removed > 0 || pruned > 0 {
            tracing::debug!(
                "Idle sweep removed {} connection(s), pruned {} presence cache(s)",
                removed,
                pruned
            );
        }
        removed
    }
}
