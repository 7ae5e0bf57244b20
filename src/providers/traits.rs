use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// A set of tokens returned from an OAuth provider after code exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

impl TokenSet {
    /// Absolute expiry of the access token, counted from `issued_at`.
    /// `None` when the provider sent no lifetime or one chrono cannot represent.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        issued_at.checked_add_signed(chrono::Duration::try_seconds(secs)?)
    }
}

/// The token endpoint operations the relay needs from an OAuth provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Unique provider identifier (e.g., "google").
    fn id(&self) -> &str;

    /// Build the authorization URL that the user should be redirected to.
    ///
    /// - `scopes`: The OAuth scopes to request.
    /// - `state`: An opaque, HMAC-signed state string for CSRF protection.
    /// - `redirect_uri`: The callback URL registered with the provider.
    fn auth_url(&self, scopes: &[String], state: &str, redirect_uri: &str) -> String;

    /// Exchange an authorization code for an access token (and optionally refresh token).
    ///
    /// Fails with [`RelayError::ProviderExchangeFailed`].
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, RelayError>;

    /// Get a new access token using a refresh token.
    ///
    /// Fails with [`RelayError::RefreshFailed`].
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, RelayError>;

    /// Revoke an access or refresh token. Not all providers support this.
    async fn revoke(&self, _token: &str) -> Result<(), RelayError> {
        Ok(())
    }
}
