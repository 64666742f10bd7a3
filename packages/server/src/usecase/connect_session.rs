//! UseCase: コネクション受付
//!
//! Identity Resolver でユーザーを特定し、Connection Registry に登録します。
//! 失敗した場合は何も作成されません。

use std::sync::Arc;

use crate::{
    domain::{ConnectRequest, ConnectionId, IdentityResolver, RealtimeError, UserId},
    infrastructure::{
        directory::RoomDirectory,
        registry::{ConnectionRegistry, OutboundReceiver},
    },
};

/// An admitted connection, handed to the transport
pub struct Admission {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    /// Messages to push to the client
    pub receiver: OutboundReceiver,
}

/// コネクション受付のユースケース
pub struct ConnectSessionUseCase {
    resolver: Arc<dyn IdentityResolver>,
    registry: Arc<ConnectionRegistry>,
    directory: Arc<RoomDirectory>,
}

impl ConnectSessionUseCase {
    pub fn new(
        resolver: Arc<dyn IdentityResolver>,
        registry: Arc<ConnectionRegistry>,
        directory: Arc<RoomDirectory>,
    ) -> Self {
        Self {
            resolver,
            registry,
            directory,
        }
    }

    /// 受付を実行
    ///
    /// # Returns
    ///
    /// * `Ok(Admission)` - 受付成功
    /// * `Err(RealtimeError::Unauthorized)` - 認証失敗
    /// * `Err(RealtimeError::CapacityExceeded | DuplicateSession)` - 受付拒否
    pub async fn execute(&self, request: &ConnectRequest) -> Result<Admission, RealtimeError> {
        let user_id = self.resolver.resolve(request).await.map_err(|e| {
            tracing::warn!("Rejected connection attempt: {}", e);
            RealtimeError::from(e)
        })?;
        let (connection_id, receiver) = self.registry.admit(user_id.clone())?;
        self.directory.register(connection_id);
        Ok(Admission {
            connection_id,
            user_id,
            receiver,
        })
    }
}
