use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::TokenStore;
use crate::auth::UserId;
use crate::error::RelayError;

/// In-process token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<UserId, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, user: &UserId) -> Result<Option<String>, RelayError> {
        Ok(self.tokens.read().await.get(user).cloned())
    }

    async fn put(&self, user: &UserId, refresh_token: &str) -> Result<(), RelayError> {
        self.tokens
            .write()
            .await
            .insert(user.clone(), refresh_token.to_string());
        Ok(())
    }

    async fn remove(&self, user: &UserId) -> Result<Option<String>, RelayError> {
        Ok(self.tokens.write().await.remove(user))
    }
}
