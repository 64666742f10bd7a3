//! InMemory History Repository 実装
//!
//! ドメイン層が定義する `HistoryRepository` trait の具体的な実装。
//! ルームごとに `VecDeque` を追記専用ログとして使用します。
//!
//! ## 保持期間
//!
//! 保持件数を超えた古いエントリは追記時に削除されます。削除後も
//! `latest_sequence` は最大値を保持するため、ルームが再作成されても
//! シーケンス番号が巻き戻ることはありません。

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{HistoryError, HistoryRepository, Message, RoomId, Sequence};

#[derive(Default)]
struct RoomLog {
    entries: VecDeque<Message>,
    high_water: Sequence,
    /// ルーム固有の保持件数（`None` ならストアのデフォルト）
    retention: Option<Option<usize>>,
}

/// インメモリ History Repository 実装
pub struct InMemoryHistoryStore {
    rooms: Mutex<HashMap<RoomId, RoomLog>>,
    default_retention: Option<usize>,
}

impl InMemoryHistoryStore {
    /// 新しい InMemoryHistoryStore を作成
    ///
    /// `default_retention` はルームごとの保持件数（`None` は無制限）
    pub fn new(default_retention: Option<usize>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            default_retention: default_retention.filter(|limit| *limit > 0),
        }
    }

    /// 保持中のエントリ数
    pub async fn retained(&self, room: &RoomId) -> usize {
        let rooms = self.rooms.lock().await;
        rooms.get(room).map_or(0, |log| log.entries.len())
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryStore {
    async fn append(&self, message: &Message) -> Result<(), HistoryError> {
        let mut rooms = self.rooms.lock().await;
        let log = rooms.entry(message.room.clone()).or_default();

        let expected = log.high_water.next();
        if message.sequence != expected {
            return Err(HistoryError::SequenceConflict {
                room: message.room.as_str().to_string(),
                expected: expected.value(),
                actual: message.sequence.value(),
            });
        }

        log.entries.push_back(message.clone());
        log.high_water = message.sequence;

        let retention = log.retention.unwrap_or(self.default_retention);
        if let Some(limit) = retention {
            while log.entries.len() > limit {
                log.entries.pop_front();
            }
        }
        Ok(())
    }

    async fn range(
        &self,
        room: &RoomId,
        from_exclusive: Sequence,
        limit: usize,
    ) -> Result<Vec<Message>, HistoryError> {
        let rooms = self.rooms.lock().await;
        let Some(log) = rooms.get(room) else {
            return Ok(Vec::new());
        };
        if from_exclusive >= log.high_water {
            return Ok(Vec::new());
        }

        // エントリは連番なので、開始位置は先頭のシーケンスから計算できる
        let start = match log.entries.front() {
            Some(oldest) if from_exclusive >= oldest.sequence => {
                (from_exclusive.value() - oldest.sequence.value() + 1) as usize
            }
            _ => 0,
        };
        Ok(log
            .entries
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_sequence(&self, room: &RoomId) -> Result<Sequence, HistoryError> {
        let rooms = self.rooms.lock().await;
        Ok(rooms.get(room).map_or(Sequence::ZERO, |log| log.high_water))
    }

    async fn set_retention(&self, room: &RoomId, limit: Option<usize>) -> Result<(), HistoryError> {
        let mut rooms = self.rooms.lock().await;
        let log = rooms.entry(room.clone()).or_default();
        let limit = limit.filter(|l| *l > 0);
        log.retention = Some(limit);
        if let Some(limit) = limit {
            while log.entries.len() > limit {
                log.entries.pop_front();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageKind, Timestamp, UserId};
    use serde_json::json;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - append: 連番の追記、連番でない追記の拒否
    // - range: 昇順での取得、範囲外指定時の空結果、冪等な読み取り
    // - 保持件数による削除と latest_sequence の維持
    // ========================================

    fn room() -> RoomId {
        RoomId::new("lobby".to_string()).unwrap()
    }

    fn message(seq: u64) -> Message {
        Message::new(
            room(),
            Sequence::new(seq),
            UserId::new("alice".to_string()).unwrap(),
            MessageKind::Chat,
            json!({ "n": seq }),
            Timestamp::new(seq as i64),
        )
    }

    async fn store_with(count: u64, retention: Option<usize>) -> InMemoryHistoryStore {
        let store = InMemoryHistoryStore::new(retention);
        for seq in 1..=count {
            store.append(&message(seq)).await.unwrap();
        }
        store
    }

    fn sequences(messages: &[Message]) -> Vec<u64> {
        messages.iter().map(|m| m.sequence.value()).collect()
    }

    #[tokio::test]
    async fn test_range_returns_ascending_after_cursor() {
        // テスト項目: range は from_exclusive より後を昇順で返す
        // given (前提条件):
        let store = store_with(5, None).await;

        // when (操作):
        let result = store.range(&room(), Sequence::new(2), 10).await.unwrap();

        // then (期待する結果):
        assert_eq!(sequences(&result), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_range_respects_limit() {
        // テスト項目: range は limit 件までしか返さない
        // given (前提条件):
        let store = store_with(5, None).await;

        // when (操作):
        let result = store.range(&room(), Sequence::ZERO, 2).await.unwrap();

        // then (期待する結果):
        assert_eq!(sequences(&result), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_range_at_or_beyond_latest_is_empty() {
        // テスト項目: 最新以上の from_exclusive では空の結果（エラーではない）
        // given (前提条件):
        let store = store_with(3, None).await;

        // when (操作):
        let at_latest = store.range(&room(), Sequence::new(3), 10).await.unwrap();
        let beyond = store.range(&room(), Sequence::new(99), 10).await.unwrap();

        // then (期待する結果):
        assert!(at_latest.is_empty());
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn test_range_of_unknown_room_is_empty() {
        // テスト項目: 記録のないルームの range は空
        // given (前提条件):
        let store = InMemoryHistoryStore::new(None);

        // when (操作):
        let result = store.range(&room(), Sequence::ZERO, 10).await.unwrap();

        // then (期待する結果):
        assert!(result.is_empty());
        assert_eq!(store.latest_sequence(&room()).await.unwrap(), Sequence::ZERO);
    }

    #[tokio::test]
    async fn test_append_rejects_gap() {
        // テスト項目: 連番にならない追記は SequenceConflict で拒否される
        // given (前提条件):
        let store = store_with(2, None).await;

        // when (操作):
        let result = store.append(&message(4)).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(HistoryError::SequenceConflict {
                room: "lobby".to_string(),
                expected: 3,
                actual: 4
            })
        );
        assert_eq!(store.latest_sequence(&room()).await.unwrap(), Sequence::new(2));
    }

    #[tokio::test]
    async fn test_retention_purges_oldest_but_keeps_high_water() {
        // テスト項目: 保持件数を超えた古いエントリが削除され、最大値は維持される
        // given (前提条件):
        let store = store_with(5, Some(2)).await;

        // when (操作):
        let result = store.range(&room(), Sequence::ZERO, 10).await.unwrap();

        // then (期待する結果):
        assert_eq!(sequences(&result), vec![4, 5]);
        assert_eq!(store.retained(&room()).await, 2);
        assert_eq!(store.latest_sequence(&room()).await.unwrap(), Sequence::new(5));
    }

    #[tokio::test]
    async fn test_room_retention_overrides_default() {
        // テスト項目: ルーム単位の保持件数がデフォルトより優先される
        // given (前提条件):
        let store = InMemoryHistoryStore::new(Some(100));
        store.set_retention(&room(), Some(1)).await.unwrap();

        // when (操作):
        for seq in 1..=3 {
            store.append(&message(seq)).await.unwrap();
        }

        // then (期待する結果):
        assert_eq!(store.retained(&room()).await, 1);
    }

    #[tokio::test]
    async fn test_range_is_idempotent() {
        // テスト項目: 同じ range を 2 回読んでも同じ結果になる
        // given (前提条件):
        let store = store_with(4, None).await;

        // when (操作):
        let first = store.range(&room(), Sequence::ZERO, 10).await.unwrap();
        let second = store.range(&room(), Sequence::ZERO, 10).await.unwrap();

        // then (期待する結果):
        assert_eq!(first, second);
        assert_eq!(sequences(&first), vec![1, 2, 3, 4]);
    }
}
