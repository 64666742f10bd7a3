//! Room Directory
//!
//! ## 責務
//!
//! - ルームとコネクションの所属関係（双方向）の管理
//! - ルームごとのシーケンス番号の保持
//! - 空になった暗黙ルームの猶予期間後の削除
//!
//! ## ロック順序
//!
//! `rooms` → `RoomSlot::turn`（try_lock のみ）→ `RoomSlot::state` → `memberships`
//!
//! `parking_lot` のロックは `.await` をまたいで保持しません。`.await` をまたぐのは
//! 配信順序を直列化する `RoomSlot::turn` だけです。

use std::{
    collections::{BTreeSet, HashMap, hash_map::Entry},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    config::RealtimeConfig,
    domain::{ConnectionId, HistoryRepository, RealtimeError, RoomId, Sequence},
};

/// Returned by `join`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinResult {
    /// Last sequence committed before this member was added. Messages after
    /// it arrive live; messages up to it are in history.
    pub sequence_at_join: Sequence,
    /// `false` when the connection was already a member
    pub newly_joined: bool,
}

/// Read-only view of a room for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub room: RoomId,
    pub members: usize,
    pub sequence: Sequence,
    pub explicit: bool,
}

struct RoomState {
    /// Join order
    members: Vec<ConnectionId>,
    committed: Sequence,
    explicit: bool,
    evicted: bool,
    /// Bumped on every membership change; a pending eviction only fires if
    /// the epoch it was scheduled with is still current.
    eviction_epoch: u64,
}

/// One room: membership and sequence under a short lock, plus the publish
/// turn that serializes sequence assignment, history append, and fan-out.
pub struct RoomSlot {
    id: RoomId,
    state: Mutex<RoomState>,
    turn: tokio::sync::Mutex<()>,
}

impl RoomSlot {
    fn new(id: RoomId, committed: Sequence, explicit: bool) -> Self {
        Self {
            id,
            state: Mutex::new(RoomState {
                members: Vec::new(),
                committed,
                explicit,
                evicted: false,
                eviction_epoch: 0,
            }),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Wait for this room's publish turn
    pub(crate) async fn publish_turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    /// Sequence the next publish will use, or `None` if the room was evicted
    /// and the caller must look it up again. Call only while holding the turn.
    pub(crate) fn next_sequence(&self) -> Option<Sequence> {
        let state = self.state.lock();
        (!state.evicted).then(|| state.committed.next())
    }

    /// Commit a durably appended sequence and snapshot the members that
    /// should receive it, in one critical section with `join`.
    pub(crate) fn commit(&self, sequence: Sequence) -> Vec<ConnectionId> {
        let mut state = self.state.lock();
        state.committed = sequence;
        state.members.clone()
    }

    fn summary(&self) -> RoomSummary {
        let state = self.state.lock();
        RoomSummary {
            room: self.id.clone(),
            members: state.members.len(),
            sequence: state.committed,
            explicit: state.explicit,
        }
    }
}

type RoomTable = Arc<Mutex<HashMap<RoomId, Arc<RoomSlot>>>>;

/// Owns room ↔ connection membership.
///
/// Rooms hold connection ids by value; a connection removed from the
/// registry simply stops receiving and is dropped from rooms by `leave_all`.
pub struct RoomDirectory {
    rooms: RoomTable,
    memberships: Mutex<HashMap<ConnectionId, BTreeSet<RoomId>>>,
    history: Arc<dyn HistoryRepository>,
    implicit_rooms: bool,
    grace_period: Duration,
}

impl RoomDirectory {
    pub fn new(config: &RealtimeConfig, history: Arc<dyn HistoryRepository>) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            memberships: Mutex::new(HashMap::new()),
            history,
            implicit_rooms: config.implicit_rooms,
            grace_period: config.room_grace_period,
        }
    }

    /// Start tracking memberships of an admitted connection
    pub fn register(&self, connection: ConnectionId) {
        self.memberships.lock().entry(connection).or_default();
    }

    /// Add `connection` to `room`.
    ///
    /// Re-joining is idempotent. The sequence is read in the same critical
    /// section as the membership insert, so every later publish reaches this
    /// member live and every earlier one is in history.
    pub async fn join(
        &self,
        connection: ConnectionId,
        room: &RoomId,
    ) -> Result<JoinResult, RealtimeError> {
        loop {
            let slot = self.slot(room, self.implicit_rooms).await?;
            let mut state = slot.state.lock();
            if state.evicted {
                // evicted between lookup and lock; look up again
                continue;
            }

            let mut memberships = self.memberships.lock();
            let Some(rooms_of_connection) = memberships.get_mut(&connection) else {
                return Err(RealtimeError::ConnectionGone(connection));
            };

            let newly_joined = !state.members.contains(&connection);
            if newly_joined {
                state.members.push(connection);
                rooms_of_connection.insert(room.clone());
                state.eviction_epoch += 1;
                tracing::debug!("Connection {} joined room '{}'", connection, room);
            }

            return Ok(JoinResult {
                sequence_at_join: state.committed,
                newly_joined,
            });
        }
    }

    /// Remove `connection` from `room`. Returns whether it was a member.
    pub fn leave(&self, connection: ConnectionId, room: &RoomId) -> bool {
        let Some(slot) = self.existing(room) else {
            if let Some(rooms) = self.memberships.lock().get_mut(&connection) {
                rooms.remove(room);
            }
            return false;
        };

        let (was_member, pending_eviction) = {
            let mut state = slot.state.lock();
            let before = state.members.len();
            state.members.retain(|member| *member != connection);
            let was_member = state.members.len() != before;
            if let Some(rooms) = self.memberships.lock().get_mut(&connection) {
                rooms.remove(room);
            }
            (was_member, was_member.then(|| Self::mark_if_empty(&mut state)).flatten())
        };

        if let Some(epoch) = pending_eviction {
            self.schedule_eviction(slot, epoch);
        }
        if was_member {
            tracing::debug!("Connection {} left room '{}'", connection, room);
        }
        was_member
    }

    /// Remove every membership of `connection` and stop tracking it.
    ///
    /// Returns the rooms it was in. Idempotent.
    pub fn leave_all(&self, connection: ConnectionId) -> Vec<RoomId> {
        let rooms: Vec<RoomId> = self
            .memberships
            .lock()
            .remove(&connection)
            .map(|rooms| rooms.into_iter().collect())
            .unwrap_or_default();

        for room in &rooms {
            let Some(slot) = self.existing(room) else {
                continue;
            };
            let pending_eviction = {
                let mut state = slot.state.lock();
                state.members.retain(|member| *member != connection);
                Self::mark_if_empty(&mut state)
            };
            if let Some(epoch) = pending_eviction {
                self.schedule_eviction(slot, epoch);
            }
        }
        rooms
    }

    /// Point-in-time member snapshot, in join order
    pub fn members(&self, room: &RoomId) -> Result<Vec<ConnectionId>, RealtimeError> {
        match self.existing(room) {
            Some(slot) => Ok(slot.state.lock().members.clone()),
            None if self.implicit_rooms => Ok(Vec::new()),
            None => Err(RealtimeError::RoomNotFound(room.clone())),
        }
    }

    pub fn rooms_of(&self, connection: ConnectionId) -> BTreeSet<RoomId> {
        self.memberships
            .lock()
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    /// Create a room explicitly. Explicit rooms are never evicted.
    ///
    /// Returns `false` if the room already existed (it becomes explicit).
    pub async fn create_room(
        &self,
        room: &RoomId,
        retention: Option<usize>,
    ) -> Result<bool, RealtimeError> {
        self.history.set_retention(room, retention).await?;
        let existed = self.existing(room).is_some();
        let slot = self.slot(room, true).await?;
        {
            let mut state = slot.state.lock();
            state.explicit = true;
            state.eviction_epoch += 1;
        }
        if !existed {
            tracing::info!("Room '{}' created", room);
        }
        Ok(!existed)
    }

    /// Room handle for a publish, created implicitly when allowed
    pub async fn slot_for_publish(&self, room: &RoomId) -> Result<Arc<RoomSlot>, RealtimeError> {
        self.slot(room, self.implicit_rooms).await
    }

    pub fn sequence(&self, room: &RoomId) -> Option<Sequence> {
        self.existing(room).map(|slot| slot.state.lock().committed)
    }

    pub fn contains(&self, room: &RoomId) -> bool {
        self.existing(room).is_some()
    }

    /// Summaries of all rooms, sorted by room id
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let slots: Vec<Arc<RoomSlot>> = self.rooms.lock().values().cloned().collect();
        let mut summaries: Vec<RoomSummary> = slots.iter().map(|slot| slot.summary()).collect();
        summaries.sort_by(|a, b| a.room.cmp(&b.room));
        summaries
    }

    fn existing(&self, room: &RoomId) -> Option<Arc<RoomSlot>> {
        self.rooms.lock().get(room).cloned()
    }

    /// Look up a room, creating it when `create` is set.
    ///
    /// A new room resumes from the history high-water mark so sequences stay
    /// gapless across eviction and recreation.
    async fn slot(&self, room: &RoomId, create: bool) -> Result<Arc<RoomSlot>, RealtimeError> {
        if let Some(slot) = self.existing(room) {
            return Ok(slot);
        }
        if !create {
            return Err(RealtimeError::RoomNotFound(room.clone()));
        }

        let seed = self.history.latest_sequence(room).await?;
        let (slot, epoch) = {
            let mut rooms = self.rooms.lock();
            match rooms.entry(room.clone()) {
                Entry::Occupied(entry) => return Ok(entry.get().clone()),
                Entry::Vacant(entry) => {
                    let slot = Arc::new(RoomSlot::new(room.clone(), seed, false));
                    entry.insert(slot.clone());
                    (slot, 0)
                }
            }
        };
        tracing::info!("Room '{}' opened at sequence {}", room, seed);

        // an implicit room nobody joins still goes away
        self.schedule_eviction(slot.clone(), epoch);
        Ok(slot)
    }

    /// Bump the epoch of an empty implicit room and return it for scheduling
    fn mark_if_empty(state: &mut RoomState) -> Option<u64> {
        if state.explicit || !state.members.is_empty() {
            return None;
        }
        state.eviction_epoch += 1;
        Some(state.eviction_epoch)
    }

    fn schedule_eviction(&self, slot: Arc<RoomSlot>, epoch: u64) {
        let rooms = self.rooms.clone();
        let grace = self.grace_period;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(grace).await;
                match try_evict(&rooms, &slot, epoch) {
                    Eviction::Busy => continue,
                    Eviction::Evicted | Eviction::Cancelled => break,
                }
            }
        });
    }
}

enum Eviction {
    Evicted,
    Cancelled,
    /// A publish holds the room's turn; try again after another grace period
    Busy,
}

fn try_evict(rooms: &RoomTable, slot: &Arc<RoomSlot>, epoch: u64) -> Eviction {
    let mut rooms = rooms.lock();
    match rooms.get(&slot.id) {
        Some(current) if Arc::ptr_eq(current, slot) => {}
        _ => return Eviction::Cancelled,
    }
    let Ok(_turn) = slot.turn.try_lock() else {
        return Eviction::Busy;
    };
    {
        let mut state = slot.state.lock();
        if state.explicit || !state.members.is_empty() || state.eviction_epoch != epoch {
            return Eviction::Cancelled;
        }
        state.evicted = true;
    }
    rooms.remove(&slot.id);
    tracing::info!("Room '{}' evicted after idle grace period", slot.id);
    Eviction::Evicted
}
