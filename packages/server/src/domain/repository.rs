//! Repository trait 定義
//!
//! ドメイン層が必要とする永続化のインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{HistoryError, Message, RoomId, Sequence};

/// History Repository trait
///
/// ルームごとの追記専用ログ。Broadcaster は配信前に必ず `append` を呼び、
/// 再接続したクライアントは `range` で取りこぼしを取得します。
///
/// ## 契約
///
/// - `append` はリトライしない（リトライ方針は呼び出し側の責務）
/// - `range` はシーケンス番号の昇順で返す
/// - `from_exclusive` が最新以上なら空の Vec を返す（エラーではない）
/// - `latest_sequence` は保持期間による削除後も最大値を保持する
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// メッセージを追記
    async fn append(&self, message: &Message) -> Result<(), HistoryError>;

    /// `from_exclusive` より後のメッセージを最大 `limit` 件取得
    async fn range(
        &self,
        room: &RoomId,
        from_exclusive: Sequence,
        limit: usize,
    ) -> Result<Vec<Message>, HistoryError>;

    /// ルームで記録済みの最大シーケンス番号（未記録なら 0）
    async fn latest_sequence(&self, room: &RoomId) -> Result<Sequence, HistoryError>;

    /// ルーム単位の保持件数を設定（`None` は無制限）
    ///
    /// 保持件数を扱わないストアはデフォルト実装のまま無視してよい
    async fn set_retention(&self, _room: &RoomId, _limit: Option<usize>) -> Result<(), HistoryError> {
        Ok(())
    }
}
