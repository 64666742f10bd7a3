//! UseCase: 履歴の取得と再生（Replay / Catch-up）
//!
//! ## 設計ノート
//!
//! - `history_since` は 1 ページ分を返す。続きは最後のシーケンス番号から再度呼ぶ
//! - `replay` はページングを隠した有限の遅延ストリーム。途中で止めても、
//!   最後に受け取ったシーケンス番号から `replay` し直せば続きから再開できる
//! - 期待するシーケンス番号が保持期間の削除で失われていた場合は
//!   `HistoryTruncated` を返す（黙って飛ばさない）

use std::{collections::VecDeque, sync::Arc};

use futures_util::{Stream, stream};

use crate::{
    domain::{HistoryRepository, Message, RealtimeError, RoomId, Sequence},
    infrastructure::directory::RoomDirectory,
};

/// Page size when the caller does not give a limit
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// 履歴取得のユースケース
pub struct ReplayHistoryUseCase {
    history: Arc<dyn HistoryRepository>,
    directory: Arc<RoomDirectory>,
    implicit_rooms: bool,
}

impl ReplayHistoryUseCase {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        directory: Arc<RoomDirectory>,
        implicit_rooms: bool,
    ) -> Self {
        Self {
            history,
            directory,
            implicit_rooms,
        }
    }

    /// Messages after `since`, ascending, at most `limit`
    pub async fn history_since(
        &self,
        room: &RoomId,
        since: Sequence,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, RealtimeError> {
        self.ensure_known(room)?;
        fetch_page(
            self.history.as_ref(),
            room,
            since,
            limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await
    }

    /// Lazily replay everything after `since` that exists when each page is
    /// read. The stream ends after the first error.
    pub fn replay(
        &self,
        room: RoomId,
        since: Sequence,
        page_size: usize,
    ) -> Result<impl Stream<Item = Result<Message, RealtimeError>> + Send + 'static, RealtimeError>
    {
        self.ensure_known(&room)?;
        let cursor = ReplayCursor {
            history: self.history.clone(),
            room,
            after: since,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            finished: false,
        };
        Ok(stream::unfold(cursor, |mut cursor| async move {
            let item = cursor.next().await?;
            Some((item, cursor))
        }))
    }

    fn ensure_known(&self, room: &RoomId) -> Result<(), RealtimeError> {
        if self.implicit_rooms || self.directory.contains(room) {
            Ok(())
        } else {
            Err(RealtimeError::RoomNotFound(room.clone()))
        }
    }
}

struct ReplayCursor {
    history: Arc<dyn HistoryRepository>,
    room: RoomId,
    after: Sequence,
    page_size: usize,
    buffer: VecDeque<Message>,
    finished: bool,
}

impl ReplayCursor {
    async fn next(&mut self) -> Option<Result<Message, RealtimeError>> {
        if self.buffer.is_empty() && !self.finished {
            match fetch_page(self.history.as_ref(), &self.room, self.after, self.page_size).await
            {
                Ok(page) if page.is_empty() => self.finished = true,
                Ok(page) => self.buffer.extend(page),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        let message = self.buffer.pop_front()?;
        self.after = message.sequence;
        Some(Ok(message))
    }
}

/// Read one page and check that it starts right after `after`
async fn fetch_page(
    history: &dyn HistoryRepository,
    room: &RoomId,
    after: Sequence,
    limit: usize,
) -> Result<Vec<Message>, RealtimeError> {
    // nothing can follow u64::MAX
    let Some(expected) = after.checked_next() else {
        return Ok(Vec::new());
    };
    if limit == 0 {
        return Ok(Vec::new());
    }
    let page = history.range(room, after, limit).await?;
    let available = match page.first() {
        Some(first) => first.sequence,
        None => {
            let latest = history.latest_sequence(room).await?;
            if latest <= after {
                return Ok(page);
            }
            latest.next()
        }
    };
    if available != expected {
        tracing::debug!(
            "History of '{}' truncated: expected #{}, oldest available #{}",
            room,
            expected,
            available
        );
        return Err(RealtimeError::HistoryTruncated {
            room: room.clone(),
            expected,
            available,
        });
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RealtimeConfig,
        domain::{MessageKind, Timestamp, UserId},
        infrastructure::repository::InMemoryHistoryStore,
    };
    use futures_util::StreamExt;
    use serde_json::json;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - history_since が since より後を昇順で返すこと
    // - replay がページをまたいで全件を順に返し、再実行しても同じ結果になること
    // - 保持期間で失われた範囲は HistoryTruncated になること
    // - 暗黙ルーム無効時の未知のルームは RoomNotFound になること
    // ========================================

    fn room() -> RoomId {
        RoomId::new("lobby".to_string()).unwrap()
    }

    async fn usecase_with(count: u64, retention: Option<usize>) -> ReplayHistoryUseCase {
        let history = Arc::new(InMemoryHistoryStore::new(retention));
        for seq in 1..=count {
            history
                .append(&Message::new(
                    room(),
                    Sequence::new(seq),
                    UserId::new("alice".to_string()).unwrap(),
                    MessageKind::Chat,
                    json!(seq),
                    Timestamp::new(0),
                ))
                .await
                .unwrap();
        }
        let directory = Arc::new(RoomDirectory::new(
            &RealtimeConfig::default(),
            history.clone(),
        ));
        ReplayHistoryUseCase::new(history, directory, true)
    }

    fn sequences(messages: &[Message]) -> Vec<u64> {
        messages.iter().map(|m| m.sequence.value()).collect()
    }

    #[tokio::test]
    async fn test_history_since_returns_tail() {
        // テスト項目: since より後のメッセージが昇順で返る
        // given (前提条件):
        let usecase = usecase_with(5, None).await;

        // when (操作):
        let result = usecase
            .history_since(&room(), Sequence::new(3), None)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(sequences(&result), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_replay_pages_through_everything_idempotently() {
        // テスト項目: replay はページをまたいで全件を返し、2 回実行しても同じ
        // given (前提条件):
        let usecase = usecase_with(7, None).await;

        // when (操作):
        let first: Vec<Message> = usecase
            .replay(room(), Sequence::ZERO, 3)
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await;
        let second: Vec<Message> = usecase
            .replay(room(), Sequence::ZERO, 3)
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await;

        // then (期待する結果):
        assert_eq!(sequences(&first), (1..=7).collect::<Vec<_>>());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_replay_restarts_from_last_seen() {
        // テスト項目: 途中で止めた replay を最後のシーケンス番号から再開できる
        // given (前提条件):
        let usecase = usecase_with(5, None).await;
        let head: Vec<Message> = usecase
            .replay(room(), Sequence::ZERO, 2)
            .unwrap()
            .take(2)
            .map(|item| item.unwrap())
            .collect()
            .await;

        // when (操作):
        let last_seen = head.last().unwrap().sequence;
        let rest: Vec<Message> = usecase
            .replay(room(), last_seen, 2)
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await;

        // then (期待する結果):
        assert_eq!(sequences(&head), vec![1, 2]);
        assert_eq!(sequences(&rest), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_purged_history_is_reported_as_truncated() {
        // テスト項目: 保持期間で削除済みの範囲を要求すると HistoryTruncated になる
        // given (前提条件):
        let usecase = usecase_with(5, Some(2)).await;

        // when (操作):
        let result = usecase.history_since(&room(), Sequence::new(1), None).await;
        let replayed: Vec<_> = usecase
            .replay(room(), Sequence::ZERO, 10)
            .unwrap()
            .collect()
            .await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(RealtimeError::HistoryTruncated {
                room: room(),
                expected: Sequence::new(2),
                available: Sequence::new(4),
            })
        );
        assert_eq!(replayed.len(), 1);
        assert!(matches!(
            replayed[0],
            Err(RealtimeError::HistoryTruncated { .. })
        ));
    }

    #[tokio::test]
    async fn test_history_since_latest_is_empty() {
        // テスト項目: 最新以降を要求すると空（エラーではない）
        // given (前提条件):
        let usecase = usecase_with(3, Some(2)).await;

        // when (操作):
        let result = usecase
            .history_since(&room(), Sequence::new(3), None)
            .await
            .unwrap();

        // then (期待する結果):
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_is_an_empty_page() {
        // テスト項目: limit = 0 は空のページを返し、HistoryTruncated にはならない
        // given (前提条件):
        let usecase = usecase_with(3, None).await;

        // when (操作):
        let empty = usecase
            .history_since(&room(), Sequence::ZERO, Some(0))
            .await;
        let full = usecase
            .history_since(&room(), Sequence::ZERO, None)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(empty, Ok(Vec::new()));
        assert_eq!(sequences(&full), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_since_at_u64_max_is_empty() {
        // テスト項目: since = u64::MAX でもパニックせず空を返す
        // given (前提条件):
        let usecase = usecase_with(3, None).await;

        // when (操作):
        let result = usecase
            .history_since(&room(), Sequence::new(u64::MAX), None)
            .await;
        let replayed: Vec<_> = usecase
            .replay(room(), Sequence::new(u64::MAX), 10)
            .unwrap()
            .collect()
            .await;

        // then (期待する結果):
        assert_eq!(result, Ok(Vec::new()));
        assert!(replayed.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_room_without_implicit_rooms() {
        // テスト項目: 暗黙ルーム無効時、未知のルームは RoomNotFound
        // given (前提条件):
        let history = Arc::new(InMemoryHistoryStore::new(None));
        let config = RealtimeConfig {
            implicit_rooms: false,
            ..RealtimeConfig::default()
        };
        let directory = Arc::new(RoomDirectory::new(&config, history.clone()));
        let usecase = ReplayHistoryUseCase::new(history, directory, false);

        // when (操作):
        let result = usecase.history_since(&room(), Sequence::ZERO, None).await;

        // then (期待する結果):
        assert_eq!(result, Err(RealtimeError::RoomNotFound(room())));
    }
}
