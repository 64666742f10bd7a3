//! Identity resolution at connection-accept time.

use async_trait::async_trait;

use super::{IdentityError, UserId};

/// What the transport knows about a connection attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Opaque credential issued by the authentication service
    pub token: Option<String>,
}

impl ConnectRequest {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

/// Maps a connect request to a stable user identity or rejects it.
///
/// Implementations wrap whatever authentication service the deployment uses;
/// this crate only consumes the result.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, request: &ConnectRequest) -> Result<UserId, IdentityError>;
}
