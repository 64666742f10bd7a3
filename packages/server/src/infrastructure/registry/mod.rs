//! Connection Registry
//!
//! ## 責務
//!
//! - 接続中のコネクションの所有（送信キュー、所有ユーザー、最終アクティビティ）
//! - 接続数上限とシングルセッションポリシーの適用
//! - コネクションへのメッセージ送信（push）とバックプレッシャーの適用
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層で行われます。Registry は受付時に送信キューを作成し、
//! 受信側（`OutboundReceiver`）を UI 層に渡します。送信側は削除が完了するまで
//! Registry が保持するため、配信中に削除されたコネクションへの送信は
//! `ConnectionGone` になるだけで、解放済みリソースに触れることはありません。

pub mod outbound;

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
    },
    time::Duration,
};

use hiroba_shared::time::Clock;
use parking_lot::RwLock;

use crate::{
    config::{BackpressurePolicy, RealtimeConfig},
    domain::{ConnectionId, Message, RealtimeError, Timestamp, UserId},
};

pub use outbound::{OutboundReceiver, OutboundSender, PushOutcome, QueueClosed, outbound_queue};

/// Why a connection was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Client closed the transport
    ClientClosed,
    /// Transport read/write failed
    TransportError,
    /// Client sent a malformed frame
    ProtocolViolation,
    /// No activity within the idle window
    Idle,
    /// Closed by the disconnect backpressure policy
    SlowConsumer,
    /// Server shutting down
    Shutdown,
}

/// Result of delivering to one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Delivered, but an older queued message was discarded
    DroppedOldest,
}

/// A live connection owned by the registry
pub struct ConnectionHandle {
    id: ConnectionId,
    user: UserId,
    connected_at: Timestamp,
    last_activity: AtomicI64,
    live: AtomicBool,
    dropped: AtomicU64,
    sender: OutboundSender,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub fn last_activity(&self) -> Timestamp {
        Timestamp::new(self.last_activity.load(Ordering::Relaxed))
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Messages discarded for this connection by the drop-oldest policy
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn queued_messages(&self) -> usize {
        self.sender.len()
    }
}

/// Owns every live connection.
///
/// Structural changes (admit / remove) take the table's write lock; sends take
/// the read lock only long enough to clone the handle. No lock is held across
/// an `.await`.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    max_connections: usize,
    single_session: bool,
    outbound_capacity: usize,
    backpressure: BackpressurePolicy,
    clock: Arc<dyn Clock>,
    dropped_total: AtomicU64,
    evicted_total: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(config: &RealtimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections: config.max_connections,
            single_session: config.single_session,
            outbound_capacity: config.outbound_capacity,
            backpressure: config.backpressure,
            clock,
            dropped_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
        }
    }

    /// Admit a connection for `user`.
    ///
    /// Fails with `CapacityExceeded` at the connection limit, or
    /// `DuplicateSession` when single-session policy is on and the user is
    /// already connected. Nothing is created on failure.
    pub fn admit(&self, user: UserId) -> Result<(ConnectionId, OutboundReceiver), RealtimeError> {
        let mut connections = self.connections.write();

        if connections.len() >= self.max_connections {
            tracing::warn!(
                "Connection limit {} reached. Rejecting '{}'",
                self.max_connections,
                user
            );
            return Err(RealtimeError::CapacityExceeded {
                limit: self.max_connections,
            });
        }
        if self.single_session && connections.values().any(|c| c.user == user) {
            tracing::warn!("User '{}' already holds a session. Rejecting", user);
            return Err(RealtimeError::DuplicateSession(user));
        }

        let id = ConnectionId::generate();
        let now = self.clock.now_millis();
        let (sender, receiver) = outbound_queue(self.outbound_capacity, self.backpressure);
        let handle = Arc::new(ConnectionHandle {
            id,
            user: user.clone(),
            connected_at: Timestamp::new(now),
            last_activity: AtomicI64::new(now),
            live: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
            sender,
        });
        connections.insert(id, handle);

        tracing::info!("Connection {} admitted for '{}'", id, user);
        Ok((id, receiver))
    }

    /// Enqueue a message on a connection's outbound queue.
    ///
    /// Never blocks. `ConnectionGone` is a report for the caller, not a
    /// failure of the caller's operation.
    pub fn send(
        &self,
        id: ConnectionId,
        message: Arc<Message>,
    ) -> Result<SendOutcome, RealtimeError> {
        match self.get(id) {
            Some(handle) => self.deliver(&handle, message),
            None => Err(RealtimeError::ConnectionGone(id)),
        }
    }

    /// Deliver to an already looked-up handle
    pub fn deliver(
        &self,
        handle: &ConnectionHandle,
        message: Arc<Message>,
    ) -> Result<SendOutcome, RealtimeError> {
        if !handle.live.load(Ordering::Acquire) {
            return Err(RealtimeError::ConnectionGone(handle.id));
        }
        match handle.sender.push(message) {
            Ok(PushOutcome::Queued) => Ok(SendOutcome::Delivered),
            Ok(PushOutcome::DroppedOldest) => {
                handle.dropped.fetch_add(1, Ordering::Relaxed);
                self.dropped_total.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropped oldest queued message for slow connection {}", handle.id);
                Ok(SendOutcome::DroppedOldest)
            }
            Ok(PushOutcome::Closed) => {
                handle.live.store(false, Ordering::Release);
                self.evicted_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Connection {} ('{}') closed: outbound queue full",
                    handle.id,
                    handle.user
                );
                Err(RealtimeError::ConnectionGone(handle.id))
            }
            Err(QueueClosed) => Err(RealtimeError::ConnectionGone(handle.id)),
        }
    }

    /// Remove a connection and close its queue.
    ///
    /// Returns the removed handle, or `None` if it was already gone; removing
    /// twice is not an error.
    pub fn remove(&self, id: ConnectionId, reason: RemovalReason) -> Option<Arc<ConnectionHandle>> {
        let removed = self.connections.write().remove(&id);
        match &removed {
            Some(handle) => {
                handle.live.store(false, Ordering::Release);
                handle.sender.close();
                tracing::info!(
                    "Connection {} ('{}') removed: {:?}",
                    id,
                    handle.user,
                    reason
                );
            }
            None => tracing::debug!("Connection {} already removed ({:?})", id, reason),
        }
        removed
    }

    /// Record inbound activity on a connection
    pub fn touch(&self, id: ConnectionId) {
        if let Some(handle) = self.get(id) {
            handle
                .last_activity
                .store(self.clock.now_millis(), Ordering::Relaxed);
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().get(&id).cloned()
    }

    /// Owner of a connection, if it is still live
    pub fn owner_of(&self, id: ConnectionId) -> Option<UserId> {
        self.get(id)
            .filter(|handle| handle.is_live())
            .map(|handle| handle.user.clone())
    }

    /// Look up many handles under a single read lock
    pub fn handles(&self, ids: &[ConnectionId]) -> Vec<(ConnectionId, Option<Arc<ConnectionHandle>>)> {
        let connections = self.connections.read();
        ids.iter()
            .map(|id| (*id, connections.get(id).cloned()))
            .collect()
    }

    pub fn connections_of(&self, user: &UserId) -> Vec<ConnectionId> {
        self.connections
            .read()
            .values()
            .filter(|handle| &handle.user == user)
            .map(|handle| handle.id)
            .collect()
    }

    /// Connections silent for longer than `window`, or no longer live
    pub fn idle_connections(&self, window: Duration) -> Vec<ConnectionId> {
        let window = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_millis().saturating_sub(window);
        self.connections
            .read()
            .values()
            .filter(|handle| !handle.is_live() || handle.last_activity.load(Ordering::Relaxed) < cutoff)
            .map(|handle| handle.id)
            .collect()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().copied().collect()
    }

    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Connections closed by the disconnect backpressure policy
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }
}
