//! Refresh token storage, keyed by the user who linked their Google account.
//!
//! - [`MemoryTokenStore`]: process-local, lost on restart. Development and tests.
//! - [`PgTokenStore`]: PostgreSQL, tokens encrypted at rest.

pub mod db;
pub mod memory;

pub use db::PgTokenStore;
pub use memory::MemoryTokenStore;

use async_trait::async_trait;

use crate::auth::UserId;
use crate::error::RelayError;

/// Holds at most one Google refresh token per user.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The refresh token stored for `user`, if any.
    async fn get(&self, user: &UserId) -> Result<Option<String>, RelayError>;

    /// Store `refresh_token` for `user`, replacing any previous value.
    async fn put(&self, user: &UserId, refresh_token: &str) -> Result<(), RelayError>;

    /// Remove and return the refresh token stored for `user`.
    async fn remove(&self, user: &UserId) -> Result<Option<String>, RelayError>;
}
