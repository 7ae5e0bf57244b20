//! PostgreSQL-backed refresh token store.
//!
//! Table `google_refresh_tokens`: one encrypted refresh token per user.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::TokenStore;
use crate::auth::UserId;
use crate::crypto::CryptoEngine;
use crate::error::RelayError;

/// Token store backed by PostgreSQL.
pub struct PgTokenStore {
    pool: PgPool,
    crypto: Arc<CryptoEngine>,
}

impl PgTokenStore {
    pub async fn new(db_url: &str, crypto: Arc<CryptoEngine>) -> Result<Self, RelayError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
            .map_err(|e| RelayError::Database(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self { pool, crypto })
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), RelayError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS google_refresh_tokens (
                user_id         TEXT PRIMARY KEY,
                refresh_token   TEXT NOT NULL,
                created_at      TIMESTAMPTZ DEFAULT NOW(),
                updated_at      TIMESTAMPTZ DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn get(&self, user: &UserId) -> Result<Option<String>, RelayError> {
        let row = sqlx::query("SELECT refresh_token FROM google_refresh_tokens WHERE user_id = $1")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let encrypted: String = row.get(0);
                Ok(Some(self.crypto.open(&encrypted)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, user: &UserId, refresh_token: &str) -> Result<(), RelayError> {
        let encrypted = self.crypto.seal(refresh_token)?;

        sqlx::query(
            r#"
            INSERT INTO google_refresh_tokens (user_id, refresh_token)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET
                refresh_token = EXCLUDED.refresh_token,
                updated_at = NOW()
            "#,
        )
        .bind(user.as_str())
        .bind(&encrypted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, user: &UserId) -> Result<Option<String>, RelayError> {
        let row = sqlx::query(
            "DELETE FROM google_refresh_tokens WHERE user_id = $1 RETURNING refresh_token",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let encrypted: String = row.get(0);
                Ok(Some(self.crypto.open(&encrypted)?))
            }
            None => Ok(None),
        }
    }
}
