//! Token table identity resolver
//!
//! 接続時に提示されたトークンをユーザー ID に対応づけます。
//!
//! - テーブルが空の場合はトークンそのものをユーザー ID として扱う（開発用）
//! - テーブルが空でない場合は登録済みのトークンだけを受け付ける

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{ConnectRequest, IdentityError, IdentityResolver, UserId};

/// Static token → user table
#[derive(Debug, Default, Clone)]
pub struct TokenTableResolver {
    tokens: HashMap<String, UserId>,
}

impl TokenTableResolver {
    pub fn new(tokens: HashMap<String, UserId>) -> Self {
        Self { tokens }
    }

    /// Accept any token and use it as the user id
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn is_passthrough(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityResolver for TokenTableResolver {
    async fn resolve(&self, request: &ConnectRequest) -> Result<UserId, IdentityError> {
        let token = request
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(IdentityError::MissingToken)?;

        if self.is_passthrough() {
            return UserId::new(token.to_string())
                .map_err(|e| IdentityError::Rejected(e.to_string()));
        }

        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::Rejected("unknown token".to_string()))
    }
}
