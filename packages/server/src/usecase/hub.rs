//! RealtimeHub: リアルタイム層のアプリケーション API
//!
//! 各ユースケースと状態の所有者（Registry / Directory / History / Presence）を
//! まとめ、プロトコルアダプタやアプリケーションのハンドラに単一の入口を提供します。
//! グローバルな状態は持たず、すべてこの構造体から辿れます。

use std::{collections::BTreeSet, sync::Arc};

use futures_util::Stream;
use hiroba_shared::time::Clock;
use serde_json::Value;

use crate::{
    config::RealtimeConfig,
    domain::{
        ConnectRequest, ConnectionId, HistoryRepository, IdentityResolver, Message,
        PresenceRecord, RealtimeError, RoomId, Sequence, UserId,
    },
    infrastructure::{
        directory::{JoinResult, RoomDirectory},
        registry::{ConnectionRegistry, RemovalReason},
    },
};

use super::{
    broadcaster::Broadcaster,
    connect_session::{Admission, ConnectSessionUseCase},
    disconnect_session::DisconnectSessionUseCase,
    join_room::JoinRoomUseCase,
    leave_room::LeaveRoomUseCase,
    presence::PresenceTracker,
    replay_history::{DEFAULT_PAGE_SIZE, ReplayHistoryUseCase},
    stats::{GetStatsUseCase, StatsSnapshot},
};

/// A room member and its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

/// Entry point of the real-time core
pub struct RealtimeHub {
    config: RealtimeConfig,
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
    broadcaster: Arc<Broadcaster>,
    presence: Arc<PresenceTracker>,
    connect_usecase: ConnectSessionUseCase,
    disconnect_usecase: DisconnectSessionUseCase,
    join_usecase: JoinRoomUseCase,
    leave_usecase: LeaveRoomUseCase,
    history_usecase: ReplayHistoryUseCase,
    stats_usecase: GetStatsUseCase,
}

impl RealtimeHub {
    /// Wire the core from its collaborators
    pub fn new(
        config: RealtimeConfig,
        resolver: Arc<dyn IdentityResolver>,
        history: Arc<dyn HistoryRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(&config, clock.clone()));
        let directory = Arc::new(RoomDirectory::new(&config, history.clone()));
        let broadcaster = Arc::new(Broadcaster::new(
            registry.clone(),
            directory.clone(),
            history.clone(),
            clock.clone(),
        ));
        let presence = Arc::new(PresenceTracker::new(
            registry.clone(),
            directory.clone(),
            broadcaster.clone(),
            clock,
            config.presence_events,
        ));

        Self {
            connect_usecase: ConnectSessionUseCase::new(
                resolver,
                registry.clone(),
                directory.clone(),
            ),
            disconnect_usecase: DisconnectSessionUseCase::new(
                registry.clone(),
                directory.clone(),
                presence.clone(),
            ),
            join_usecase: JoinRoomUseCase::new(
                registry.clone(),
                directory.clone(),
                presence.clone(),
            ),
            leave_usecase: LeaveRoomUseCase::new(directory.clone(), presence.clone()),
            history_usecase: ReplayHistoryUseCase::new(
                history,
                directory.clone(),
                config.implicit_rooms,
            ),
            stats_usecase: GetStatsUseCase::new(registry.clone(), directory.clone()),
            config,
            registry,
            directory,
            broadcaster,
            presence,
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Authorize and admit a connection
    pub async fn connect(&self, request: &ConnectRequest) -> Result<Admission, RealtimeError> {
        self.connect_usecase.execute(request).await
    }

    /// Tear a connection down. Idempotent.
    pub async fn disconnect(&self, connection: ConnectionId, reason: RemovalReason) -> bool {
        self.disconnect_usecase.execute(connection, reason).await
    }

    pub async fn join(
        &self,
        connection: ConnectionId,
        room: &RoomId,
    ) -> Result<JoinResult, RealtimeError> {
        self.join_usecase.execute(connection, room).await
    }

    pub async fn leave(&self, connection: ConnectionId, room: &RoomId) -> bool {
        self.leave_usecase.execute(connection, room).await
    }

    /// Publish on behalf of a connection's owner
    pub async fn publish(
        &self,
        connection: ConnectionId,
        room: &RoomId,
        payload: Value,
    ) -> Result<Sequence, RealtimeError> {
        let sender = self
            .registry
            .owner_of(connection)
            .ok_or(RealtimeError::ConnectionGone(connection))?;
        self.broadcaster.publish(room, &sender, payload).await
    }

    /// Publish as `sender` without a connection, e.g. from a server-side job
    pub async fn publish_as(
        &self,
        room: &RoomId,
        sender: &UserId,
        payload: Value,
    ) -> Result<Sequence, RealtimeError> {
        self.broadcaster.publish(room, sender, payload).await
    }

    /// Members of `room` in join order. Connections removed since joining
    /// are left out.
    pub fn members(&self, room: &RoomId) -> Result<Vec<MemberInfo>, RealtimeError> {
        let members = self.directory.members(room)?;
        Ok(self
            .registry
            .handles(&members)
            .into_iter()
            .filter_map(|(connection_id, handle)| {
                handle.map(|handle| MemberInfo {
                    connection_id,
                    user_id: handle.user().clone(),
                })
            })
            .collect())
    }

    pub fn rooms_of(&self, connection: ConnectionId) -> BTreeSet<RoomId> {
        self.directory.rooms_of(connection)
    }

    pub async fn history_since(
        &self,
        room: &RoomId,
        since: Sequence,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, RealtimeError> {
        self.history_usecase.history_since(room, since, limit).await
    }

    pub fn replay(
        &self,
        room: RoomId,
        since: Sequence,
    ) -> Result<impl Stream<Item = Result<Message, RealtimeError>> + Send + 'static, RealtimeError>
    {
        self.history_usecase.replay(room, since, DEFAULT_PAGE_SIZE)
    }

    /// Create a room explicitly with an optional retention override.
    /// Returns `false` if it already existed.
    pub async fn create_room(
        &self,
        room: &RoomId,
        retention: Option<usize>,
    ) -> Result<bool, RealtimeError> {
        self.directory.create_room(room, retention).await
    }

    /// Last committed sequence of `room`, or `None` if the room does not
    /// exist (never created, or evicted)
    pub fn room_sequence(&self, room: &RoomId) -> Option<Sequence> {
        self.directory.sequence(room)
    }

    pub fn room_presence(&self, room: &RoomId) -> Vec<PresenceRecord> {
        self.presence.room_presence(room)
    }

    pub fn user_presence(&self, user: &UserId) -> Option<PresenceRecord> {
        self.presence.user_presence(user)
    }

    /// Record inbound activity for the idle sweeper
    pub fn touch(&self, connection: ConnectionId) {
        self.registry.touch(connection);
    }

    /// Remove idle connections once, using the configured timeout
    pub async fn sweep_idle(&self) -> usize {
        self.disconnect_usecase
            .sweep_idle(self.config.idle_timeout)
            .await
    }

    /// Remove every connection
    pub async fn shutdown(&self) {
        for connection in self.registry.connection_ids() {
            self.disconnect(connection, RemovalReason::Shutdown).await;
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats_usecase.execute()
    }
}
