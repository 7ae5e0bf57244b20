use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{OAuthProvider, TokenSet};
use crate::config::GoogleEndpoints;
use crate::error::RelayError;

/// Read-only Drive and Calendar access, the only scopes the relay uses.
pub const RELAY_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// Google OAuth 2.0 provider.
///
/// Token lifetime: 1 hour.
/// Refresh: Supported (requires `access_type=offline` and `prompt=consent`).
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    endpoints: GoogleEndpoints,
    http: reqwest::Client,
}

// Raw token response from Google's token endpoint
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: Option<u64>,
    scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

// Error body from the token endpoint: {"error": "invalid_grant", "error_description": "Bad Request"}
#[derive(Debug, Deserialize)]
struct GoogleTokenError {
    error: Option<String>,
    error_description: Option<String>,
}

impl From<GoogleTokenResponse> for TokenSet {
    fn from(r: GoogleTokenResponse) -> Self {
        TokenSet {
            access_token: r.access_token,
            // Google doesn't always return a new refresh token on refresh
            refresh_token: r.refresh_token,
            token_type: r.token_type,
            expires_in: r.expires_in,
            scope: r.scope,
        }
    }
}

impl GoogleProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        endpoints: GoogleEndpoints,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            endpoints,
            http,
        }
    }

    /// POST a form to the token endpoint and decode the token set. Failures
    /// are reported as the readable detail string Google sent back.
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, String> {
        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| format!("token request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(token_error_detail(status, &body));
        }

        let token_resp: GoogleTokenResponse = resp
            .json()
            .await
            .map_err(|e| format!("failed to parse token response: {e}"))?;

        Ok(token_resp.into())
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn auth_url(&self, scopes: &[String], state: &str, redirect_uri: &str) -> String {
        let scope_str = scopes.join(" ");
        format!(
            "{base}?\
             client_id={client_id}\
             &redirect_uri={redirect_uri}\
             &response_type=code\
             &scope={scope}\
             &state={state}\
             &access_type=offline\
             &prompt=consent",
            base = self.endpoints.auth_url,
            client_id = urlencoding(&self.client_id),
            redirect_uri = urlencoding(redirect_uri),
            scope = urlencoding(&scope_str),
            state = urlencoding(state),
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, RelayError> {
        self.token_request(&[
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
        .map_err(RelayError::ProviderExchangeFailed)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, RelayError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
        .map_err(RelayError::RefreshFailed)
    }

    async fn revoke(&self, token: &str) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(&self.endpoints.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| RelayError::ProviderError(format!("Revoke request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::ProviderError(format!(
                "Google revoke failed: {}",
                token_error_detail(status, &body)
            )));
        }

        Ok(())
    }
}

fn token_error_detail(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<GoogleTokenError>(body) {
        match (err.error, err.error_description) {
            (Some(code), Some(desc)) => return format!("{code}: {desc}"),
            (None, Some(desc)) => return desc,
            (Some(code), None) => return code,
            (None, None) => {}
        }
    }
    format!("HTTP {}: {}", status.as_u16(), body.trim())
}

/// Simple percent-encoding for URL parameters.
fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
