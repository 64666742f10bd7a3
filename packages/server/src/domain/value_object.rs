//! Value objects.
//!
//! 識別子とシーケンス番号を型で区別し、生の String / u64 の取り違えを防ぎます。

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValidationError;

const MAX_ID_LENGTH: usize = 64;

/// Validate an identifier: non-empty, bounded, `[A-Za-z0-9_.:-]` only.
fn validate_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if value.chars().count() > MAX_ID_LENGTH {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_ID_LENGTH,
        });
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
    {
        return Err(ValidationError::InvalidCharacter { field, ch });
    }
    Ok(())
}

/// Opaque connection identifier, unique for the lifetime of one link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable user identity resolved at connect time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(value: String) -> Result<Self, ValidationError> {
        validate_identifier("user_id", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room (channel) name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: String) -> Result<Self, ValidationError> {
        validate_identifier("room_id", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomId> for String {
    fn from(value: RoomId) -> Self {
        value.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-room message sequence number.
///
/// `Sequence::ZERO` means "nothing published yet"; the first message is 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Sequence(u64);

impl Sequence {
    pub const ZERO: Sequence = Sequence(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The following sequence, saturating at `u64::MAX`
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn checked_next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_accepts_typical_names() {
        // テスト項目: 一般的なルーム名が受け入れられる
        // given (前提条件):
        let names = ["lobby", "team-42", "org.acme:general", "R1"];

        // when (操作):
        let results: Vec<_> = names
            .iter()
            .map(|n| RoomId::new(n.to_string()))
            .collect();

        // then (期待する結果):
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_room_id_rejects_empty() {
        // テスト項目: 空文字列のルーム名はエラーになる
        // given (前提条件):
        let name = String::new();

        // when (操作):
        let result = RoomId::new(name);

        // then (期待する結果):
        assert_eq!(result, Err(ValidationError::Empty("room_id")));
    }

    #[test]
    fn test_user_id_rejects_whitespace() {
        // テスト項目: 空白を含むユーザー ID はエラーになる
        // given (前提条件):
        let name = "alice smith".to_string();

        // when (操作):
        let result = UserId::new(name);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ValidationError::InvalidCharacter {
                field: "user_id",
                ch: ' '
            })
        );
    }

    #[test]
    fn test_user_id_rejects_too_long() {
        // テスト項目: 長すぎるユーザー ID はエラーになる
        // given (前提条件):
        let name = "a".repeat(MAX_ID_LENGTH + 1);

        // when (操作):
        let result = UserId::new(name);

        // then (期待する結果):
        assert!(matches!(result, Err(ValidationError::TooLong { .. })));
    }

    #[test]
    fn test_sequence_next_increments() {
        // テスト項目: Sequence::next は 1 増やした値を返す
        // given (前提条件):
        let seq = Sequence::ZERO;

        // when (操作):
        let next = seq.next().next();

        // then (期待する結果):
        assert_eq!(next.value(), 2);
    }

    #[test]
    fn test_sequence_next_at_max() {
        // テスト項目: u64::MAX の次は checked_next では None、next では飽和する
        // given (前提条件):
        let seq = Sequence::new(u64::MAX);

        // when (操作):
        let checked = seq.checked_next();
        let saturated = seq.next();

        // then (期待する結果):
        assert_eq!(checked, None);
        assert_eq!(saturated, seq);
    }

    #[test]
    fn test_connection_ids_are_unique() {
        // テスト項目: 生成される ConnectionId は重複しない
        // given (前提条件):
        let a = ConnectionId::generate();

        // when (操作):
        let b = ConnectionId::generate();

        // then (期待する結果):
        assert_ne!(a, b);
    }
}
