//! UseCase: メッセージ配信（Broadcaster）
//!
//! ## 配信手順
//!
//! 1. ルームの配信ターンを取得し、次のシーケンス番号を決める
//! 2. History に追記する（失敗したら `PersistenceFailure`、配信は一切しない）
//! 3. シーケンス番号の確定とメンバーのスナップショットを同一クリティカルセクションで行う
//! 4. 各メンバーへベストエフォートで送信（`ConnectionGone` は握りつぶす）
//! 5. 確定したシーケンス番号を返す
//!
//! 配信ターンは 1〜4 の間保持されるため、同じルームへの配信は追記順に
//! 全メンバーへ届きます。別ルームの配信は互いにブロックしません。

use std::sync::Arc;

use hiroba_shared::time::Clock;
use serde_json::Value;

use crate::{
    domain::{
        HistoryRepository, Message, MessageKind, RealtimeError, RoomId, Sequence, Timestamp,
        UserId,
    },
    infrastructure::{
        directory::RoomDirectory,
        registry::{ConnectionRegistry, SendOutcome},
    },
};

/// Per-publish delivery counts, for logging
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DeliveryReport {
    delivered: usize,
    dropped_oldest: usize,
    gone: usize,
}

/// Fans messages out to room members with a total order per room
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
    history: Arc<dyn HistoryRepository>,
    clock: Arc<dyn Clock>,
}

impl Broadcaster {
    /// 新しい Broadcaster を作成
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<RoomDirectory>,
        history: Arc<dyn HistoryRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            directory,
            history,
            clock,
        }
    }

    /// Publish an application payload to `room`.
    ///
    /// Returns once the message is durably appended, regardless of how many
    /// members actually received it.
    pub async fn publish(
        &self,
        room: &RoomId,
        sender: &UserId,
        payload: Value,
    ) -> Result<Sequence, RealtimeError> {
        self.publish_kind(room, sender, MessageKind::Chat, payload)
            .await
    }

    pub(crate) async fn publish_kind(
        &self,
        room: &RoomId,
        sender: &UserId,
        kind: MessageKind,
        payload: Value,
    ) -> Result<Sequence, RealtimeError> {
        loop {
            let slot = self.directory.slot_for_publish(room).await?;
            let _turn = slot.publish_turn().await;
            let Some(sequence) = slot.next_sequence() else {
                continue;
            };

            let message = Arc::new(Message::new(
                room.clone(),
                sequence,
                sender.clone(),
                kind,
                payload,
                Timestamp::new(self.clock.now_millis()),
            ));

            if let Err(e) = self.history.append(&message).await {
                tracing::warn!(
                    "Publish to room '{}' aborted, history append failed: {}",
                    room,
                    e
                );
                return Err(e.into());
            }

            let members = slot.commit(sequence);
            let report = self.fan_out(&members, &message);
            tracing::debug!(
                "Published {} #{} from '{}': {:?}",
                room,
                sequence,
                sender,
                report
            );
            return Ok(sequence);
        }
    }

    fn fan_out(
        &self,
        members: &[crate::domain::ConnectionId],
        message: &Arc<Message>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for (id, handle) in self.registry.handles(members) {
            let result = match handle {
                Some(handle) => self.registry.deliver(&handle, message.clone()),
                None => Err(RealtimeError::ConnectionGone(id)),
            };
            match result {
                Ok(SendOutcome::Delivered) => report.delivered += 1,
                Ok(SendOutcome::DroppedOldest) => {
                    report.delivered += 1;
                    report.dropped_oldest += 1;
                }
                Err(e) => {
                    // the member can still catch up from history
                    tracing::debug!("Skipping member {}: {}", id, e);
                    report.gone += 1;
                }
            }
        }
        report
    }
}
