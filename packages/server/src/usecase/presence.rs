//! UseCase: プレゼンス追跡（Presence Tracker）
//!
//! ## 責務
//!
//! - ルームごとのオンラインユーザーを所属関係とコネクションの所有者から導出する
//! - 状態遷移（online ⇄ offline）を検出し、プレゼンスメッセージとしてルームへ配信する
//!
//! ## 設計ノート
//!
//! プレゼンスは独立した状態ではなく、`RoomDirectory` と `ConnectionRegistry`
//! から常に再計算できる派生値です。ここで保持するのは「前回通知した状態」の
//! キャッシュだけで、遷移を一度だけ通知するために使います。
//!
//! 同じユーザーが複数のコネクションで参加している場合、最後のコネクションが
//! 抜けたときだけ offline になります。
//!
//! ルームごとのキャッシュは tokio の Mutex で保護し、再計算と通知の間保持します。
//! これにより同じルームの遷移通知は必ず検出順に配信されます。

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use hiroba_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{
        MessageKind, PresenceDiff, PresenceRecord, PresenceState, RoomId, Timestamp, UserId,
        derive_online_users, diff_presence,
    },
    infrastructure::{directory::RoomDirectory, registry::ConnectionRegistry},
};

use super::broadcaster::Broadcaster;

/// Last announced presence of one room
#[derive(Debug, Default)]
struct RoomPresence {
    online: BTreeMap<UserId, Timestamp>,
    offline: BTreeMap<UserId, Timestamp>,
}

type RoomCell = Arc<tokio::sync::Mutex<RoomPresence>>;

/// Derives and announces presence
pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
    broadcaster: Arc<Broadcaster>,
    clock: Arc<dyn Clock>,
    publish_events: bool,
    rooms: parking_lot::Mutex<HashMap<RoomId, RoomCell>>,
}

impl PresenceTracker {
    /// 新しい PresenceTracker を作成
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<RoomDirectory>,
        broadcaster: Arc<Broadcaster>,
        clock: Arc<dyn Clock>,
        publish_events: bool,
    ) -> Self {
        Self {
            registry,
            directory,
            broadcaster,
            clock,
            publish_events,
            rooms: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Recompute presence of `room` after a membership change and announce
    /// every transition exactly once.
    ///
    /// A failed announcement is logged; the transition still counts as
    /// announced so it is not repeated.
    pub async fn refresh(&self, room: &RoomId) -> PresenceDiff {
        let cell = self.cell(room);
        let mut cached = cell.lock().await;

        let current = self.online_users(room);
        let previous: BTreeSet<UserId> = cached.online.keys().cloned().collect();
        let diff = diff_presence(&previous, &current);
        if diff.is_empty() {
            return diff;
        }

        let now = Timestamp::new(self.clock.now_millis());
        for user in &diff.came_online {
            cached.offline.remove(user);
            cached.online.insert(user.clone(), now);
        }
        for user in &diff.went_offline {
            cached.online.remove(user);
            cached.offline.insert(user.clone(), now);
        }

        if !self.publish_events {
            return diff;
        }
        for user in &diff.came_online {
            self.announce(room, user, PresenceState::Online).await;
        }
        for user in &diff.went_offline {
            self.announce(room, user, PresenceState::Offline).await;
        }
        diff
    }

    /// Presence of every user seen in `room`, online first
    pub fn room_presence(&self, room: &RoomId) -> Vec<PresenceRecord> {
        let Some(cell) = self.rooms.lock().get(room).cloned() else {
            return Vec::new();
        };
        // a refresh in progress only delays this read
        let Ok(cached) = cell.try_lock() else {
            return self.derived_room_presence(room);
        };

        let online = cached.online.iter().map(|(user, since)| PresenceRecord {
            user: user.clone(),
            state: PresenceState::Online,
            rooms: BTreeSet::from([room.clone()]),
            changed_at: *since,
        });
        let offline = cached.offline.iter().map(|(user, since)| PresenceRecord {
            user: user.clone(),
            state: PresenceState::Offline,
            rooms: BTreeSet::new(),
            changed_at: *since,
        });
        online.chain(offline).collect()
    }

    /// Presence of `user` across all rooms, if the user was ever seen
    pub fn user_presence(&self, user: &UserId) -> Option<PresenceRecord> {
        let cells: Vec<(RoomId, RoomCell)> = self
            .rooms
            .lock()
            .iter()
            .map(|(room, cell)| (room.clone(), cell.clone()))
            .collect();

        let mut rooms = BTreeSet::new();
        let mut online_since: Option<Timestamp> = None;
        let mut offline_since: Option<Timestamp> = None;
        for (room, cell) in cells {
            let Ok(cached) = cell.try_lock() else {
                if self.online_users(&room).contains(user) {
                    rooms.insert(room);
                }
                continue;
            };
            if let Some(since) = cached.online.get(user) {
                rooms.insert(room);
                online_since = Some(online_since.map_or(*since, |earliest| earliest.min(*since)));
            } else if let Some(since) = cached.offline.get(user) {
                offline_since = offline_since.max(Some(*since));
            }
        }

        if !rooms.is_empty() {
            return Some(PresenceRecord {
                user: user.clone(),
                state: PresenceState::Online,
                rooms,
                changed_at: online_since.unwrap_or_else(|| self.now()),
            });
        }
        offline_since.map(|since| PresenceRecord {
            user: user.clone(),
            state: PresenceState::Offline,
            rooms,
            changed_at: since,
        })
    }

    /// Drop cached presence of rooms that no longer exist and have nobody
    /// online
    pub fn prune(&self) -> usize {
        let mut rooms = self.rooms.lock();
        let before = rooms.len();
        rooms.retain(|room, cell| {
            self.directory.contains(room)
                || cell.try_lock().map_or(true, |cached| !cached.online.is_empty())
        });
        before - rooms.len()
    }

    fn cell(&self, room: &RoomId) -> RoomCell {
        self.rooms.lock().entry(room.clone()).or_default().clone()
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// Users with at least one live connection in `room`
    fn online_users(&self, room: &RoomId) -> BTreeSet<UserId> {
        let members = self.directory.members(room).unwrap_or_default();
        let owners: Vec<_> = members
            .into_iter()
            .map(|connection| (connection, self.registry.owner_of(connection)))
            .collect();
        derive_online_users(&owners).into_keys().collect()
    }

    fn derived_room_presence(&self, room: &RoomId) -> Vec<PresenceRecord> {
        let now = self.now();
        self.online_users(room)
            .into_iter()
            .map(|user| PresenceRecord {
                user,
                state: PresenceState::Online,
                rooms: BTreeSet::from([room.clone()]),
                changed_at: now,
            })
            .collect()
    }

    async fn announce(&self, room: &RoomId, user: &UserId, state: PresenceState) {
        let payload = json!({ "user": user, "state": state });
        match self
            .broadcaster
            .publish_kind(room, user, MessageKind::Presence, payload)
            .await
        {
            Ok(sequence) => {
                tracing::info!("'{}' is {:?} in room '{}' (#{})", user, state, room, sequence)
            }
            Err(e) => tracing::warn!(
                "Failed to announce '{}' {:?} in room '{}': {}",
                user,
                state,
                room,
                e
            ),
        }
    }
}
