pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod google;
pub mod providers;
pub mod relay;
pub mod store;

pub use config::Config;
pub use error::RelayError;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use auth::{FirebaseVerifier, IdentityVerifier, JwksKeyStore};
use crypto::CryptoEngine;
use google::GoogleApiClient;
use providers::{GoogleProvider, OAuthProvider};
use store::{MemoryTokenStore, PgTokenStore, TokenStore};

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub store: Box<dyn TokenStore>,
    pub crypto: Arc<CryptoEngine>,
    pub provider: Box<dyn OAuthProvider>,
    pub google: GoogleApiClient,
    pub identity: IdentityVerifier,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire up every component from configuration.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let crypto = crypto_from_config(&config)?;
        let crypto = Arc::new(crypto);

        let store: Box<dyn TokenStore> = match &config.database_url {
            Some(url) => {
                let store = PgTokenStore::new(url, crypto.clone()).await?;
                store.migrate().await?;
                info!("Database connected and migrated ✓");
                Box::new(store)
            }
            None => {
                warn!("DATABASE_URL not set; refresh tokens are kept in memory only");
                Box::new(MemoryTokenStore::new())
            }
        };

        let identity = match &config.firebase_project_id {
            Some(project_id) => {
                let jwks = JwksKeyStore::new(&config.google.securetoken_jwks_url, http.clone());
                if let Err(e) = jwks.warm_cache().await {
                    warn!("Failed to fetch JWKS keys: {e}. Will retry on first request.");
                }
                info!("Verifying Firebase ID tokens for project {project_id}");
                IdentityVerifier::Firebase(FirebaseVerifier::new(project_id.clone(), jwks))
            }
            None => {
                warn!(
                    "FIREBASE_PROJECT_ID not set; running single-tenant. \
                     All callers share one Google connection. DO NOT use this in production!"
                );
                IdentityVerifier::SingleTenant
            }
        };

        let provider = GoogleProvider::new(
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
            config.google.clone(),
            http.clone(),
        );
        let google = GoogleApiClient::new(http, config.google.api_base.clone());

        Ok(Self {
            config,
            store,
            crypto,
            provider: Box::new(provider),
            google,
            identity,
        })
    }
}

/// Keys from `MASTER_KEY`/`HMAC_SECRET`, or ephemeral ones when nothing is
/// persisted. A database needs stable keys: tokens sealed with ephemeral
/// keys cannot be opened after a restart.
fn crypto_from_config(config: &Config) -> anyhow::Result<CryptoEngine> {
    match (&config.master_key, &config.hmac_secret) {
        (Some(master), Some(hmac)) => {
            CryptoEngine::new(master, hmac).context("Invalid MASTER_KEY/HMAC_SECRET")
        }
        _ if config.database_url.is_some() => anyhow::bail!(
            "DATABASE_URL is set but MASTER_KEY and HMAC_SECRET are not; \
             stored refresh tokens would be unreadable after a restart"
        ),
        _ => {
            warn!(
                "MASTER_KEY/HMAC_SECRET not set; using ephemeral keys. \
                 Pending OAuth states will not survive a restart."
            );
            Ok(CryptoEngine::ephemeral()?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleEndpoints;
    use base64::Engine as _;

    fn config(database_url: Option<&str>, keys: bool) -> Config {
        let key = base64::engine::general_purpose::STANDARD.encode([1u8; 32]);
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec![],
            google_client_id: "client".into(),
            google_client_secret: "secret".into(),
            google_redirect_uri: "http://localhost:5173/google-callback".into(),
            google: GoogleEndpoints::default(),
            http_timeout_secs: 5,
            firebase_project_id: None,
            database_url: database_url.map(String::from),
            master_key: keys.then(|| key.clone()),
            hmac_secret: keys.then(|| key.clone()),
        }
    }

    #[test]
    fn database_without_keys_is_refused() {
        let err = crypto_from_config(&config(Some("postgres://localhost/relay"), false))
            .err()
            .unwrap();
        assert!(err.to_string().contains("MASTER_KEY"));
    }

    #[test]
    fn keys_are_optional_without_a_database() {
        assert!(crypto_from_config(&config(None, false)).is_ok());
        assert!(crypto_from_config(&config(None, true)).is_ok());
        assert!(crypto_from_config(&config(Some("postgres://localhost/relay"), true)).is_ok());
    }

    #[tokio::test]
    async fn startup_fails_before_touching_the_database() {
        let result = AppState::from_config(config(Some("postgres://127.0.0.1:9/relay"), false)).await;
        assert!(result.is_err());
    }
}
