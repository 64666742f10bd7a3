//! Application event handler
//!
//! プロトコルアダプタはビジネス状態を持たず、受信したフレームをすべて
//! 登録された `EventHandler` に渡します。アプリケーションは独自の
//! ハンドラを実装することで、参加できるルームの制限やペイロードの検証を
//! 追加できます。`RoomEventHandler` はすべてのフレームを `RealtimeHub`
//! の操作にそのまま対応づける標準の実装です。

use async_trait::async_trait;
use hiroba_shared::protocol::{ClientFrame, MessageFrame, PresenceFrame, ServerFrame};
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, RealtimeError, RoomId, Sequence, UserId},
    infrastructure::dto::conversion::member_frame,
    usecase::RealtimeHub,
};

/// One connected client, as seen by an event handler
#[derive(Clone)]
pub struct Session {
    connection_id: ConnectionId,
    user_id: UserId,
    replies: mpsc::UnboundedSender<ServerFrame>,
}

impl Session {
    pub fn new(
        connection_id: ConnectionId,
        user_id: UserId,
        replies: mpsc::UnboundedSender<ServerFrame>,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            replies,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Send a frame to this client only. Dropped silently once the
    /// connection is closing.
    pub fn reply(&self, frame: ServerFrame) {
        if self.replies.send(frame).is_err() {
            tracing::debug!("Reply to closed connection {} dropped", self.connection_id);
        }
    }
}

/// Hooks invoked by the WebSocket adapter.
///
/// An error returned from `on_frame` is sent back to the client as an error
/// frame; `ProtocolViolation` also closes the connection.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_connect(&self, _hub: &RealtimeHub, _session: &Session) {}

    async fn on_frame(
        &self,
        hub: &RealtimeHub,
        session: &Session,
        frame: ClientFrame,
    ) -> Result<(), RealtimeError>;

    async fn on_disconnect(&self, _hub: &RealtimeHub, _session: &Session) {}
}

/// Maps each client frame to the matching hub operation
#[derive(Debug, Default, Clone, Copy)]
pub struct RoomEventHandler;

#[async_trait]
impl EventHandler for RoomEventHandler {
    async fn on_frame(
        &self,
        hub: &RealtimeHub,
        session: &Session,
        frame: ClientFrame,
    ) -> Result<(), RealtimeError> {
        let connection = session.connection_id();
        let reply = match frame {
            ClientFrame::Join { room } => {
                let room_id = RoomId::new(room)?;
                let joined = hub.join(connection, &room_id).await?;
                ServerFrame::Joined {
                    room: room_id.into_string(),
                    sequence_at_join: joined.sequence_at_join.value(),
                }
            }
            ClientFrame::Leave { room } => {
                let room_id = RoomId::new(room)?;
                hub.leave(connection, &room_id).await;
                ServerFrame::Left {
                    room: room_id.into_string(),
                }
            }
            ClientFrame::Publish { room, payload } => {
                let room_id = RoomId::new(room)?;
                let sequence = hub.publish(connection, &room_id, payload).await?;
                ServerFrame::Published {
                    room: room_id.into_string(),
                    sequence: sequence.value(),
                }
            }
            ClientFrame::History { room, since, limit } => {
                let room_id = RoomId::new(room)?;
                let messages = hub
                    .history_since(&room_id, Sequence::new(since), limit)
                    .await?;
                ServerFrame::History {
                    room: room_id.into_string(),
                    messages: messages.iter().map(MessageFrame::from).collect(),
                }
            }
            ClientFrame::Members { room } => {
                let room_id = RoomId::new(room)?;
                let members = hub.members(&room_id)?;
                ServerFrame::Members {
                    room: room_id.into_string(),
                    members: members
                        .iter()
                        .map(|member| member_frame(member.connection_id, &member.user_id))
                        .collect(),
                }
            }
            ClientFrame::Presence { room } => {
                let room_id = RoomId::new(room)?;
                let users = hub.room_presence(&room_id);
                ServerFrame::Presence {
                    room: room_id.into_string(),
                    users: users.iter().map(PresenceFrame::from).collect(),
                }
            }
            ClientFrame::Ping => ServerFrame::Pong,
        };
        session.reply(reply);
        Ok(())
    }
}
