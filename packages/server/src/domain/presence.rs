//! Presence derivation.
//!
//! Presence is never stored as a source of truth. It is recomputed from a
//! room's membership snapshot joined with the registry's owner lookup, and
//! transitions are the difference between two derivations.

use std::collections::{BTreeMap, BTreeSet};

use super::{ConnectionId, UserId};

/// Count live connections per user among a room's members.
///
/// `members` pairs each member connection with its owner, or `None` when the
/// connection is no longer live. Dead connections do not count.
pub fn derive_online_users(members: &[(ConnectionId, Option<UserId>)]) -> BTreeMap<UserId, usize> {
    let mut online: BTreeMap<UserId, usize> = BTreeMap::new();
    for user in members.iter().filter_map(|(_, owner)| owner.as_ref()) {
        *online.entry(user.clone()).or_default() += 1;
    }
    online
}

/// Transitions between two derived online sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceDiff {
    pub came_online: Vec<UserId>,
    pub went_offline: Vec<UserId>,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.came_online.is_empty() && self.went_offline.is_empty()
    }
}

pub fn diff_presence(previous: &BTreeSet<UserId>, current: &BTreeSet<UserId>) -> PresenceDiff {
    PresenceDiff {
        came_online: current.difference(previous).cloned().collect(),
        went_offline: previous.difference(current).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        UserId::new(name.to_string()).unwrap()
    }

    #[test]
    fn test_derive_counts_connections_per_user() {
        // テスト項目: 同一ユーザーの複数接続が 1 ユーザーとして数えられる
        // given (前提条件):
        let members = vec![
            (ConnectionId::generate(), Some(user("alice"))),
            (ConnectionId::generate(), Some(user("alice"))),
            (ConnectionId::generate(), Some(user("bob"))),
        ];

        // when (操作):
        let online = derive_online_users(&members);

        // then (期待する結果):
        assert_eq!(online.len(), 2);
        assert_eq!(online[&user("alice")], 2);
        assert_eq!(online[&user("bob")], 1);
    }

    #[test]
    fn test_derive_ignores_dead_connections() {
        // テスト項目: 既に切断された接続はオンラインに数えない
        // given (前提条件):
        let members = vec![
            (ConnectionId::generate(), None),
            (ConnectionId::generate(), Some(user("bob"))),
        ];

        // when (操作):
        let online = derive_online_users(&members);

        // then (期待する結果):
        assert_eq!(online.keys().cloned().collect::<Vec<_>>(), vec![user("bob")]);
    }

    #[test]
    fn test_diff_reports_both_directions() {
        // テスト項目: 差分からオンライン化とオフライン化の両方が得られる
        // given (前提条件):
        let previous: BTreeSet<_> = [user("alice"), user("bob")].into_iter().collect();
        let current: BTreeSet<_> = [user("bob"), user("carol")].into_iter().collect();

        // when (操作):
        let diff = diff_presence(&previous, &current);

        // then (期待する結果):
        assert_eq!(diff.came_online, vec![user("carol")]);
        assert_eq!(diff.went_offline, vec![user("alice")]);
    }

    #[test]
    fn test_diff_of_identical_sets_is_empty() {
        // テスト項目: 同じ集合同士の差分は空になる
        // given (前提条件):
        let set: BTreeSet<_> = [user("alice")].into_iter().collect();

        // when (操作):
        let diff = diff_presence(&set, &set);

        // then (期待する結果):
        assert!(diff.is_empty());
    }
}
