use anyhow::{Context, Result};

/// Google endpoints the relay talks to. Overridable so tests and proxies can
/// point the relay somewhere else.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    /// Base for the Drive and Calendar REST APIs.
    pub api_base: String,
    /// JWKS used to verify Firebase ID tokens.
    pub securetoken_jwks_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            revoke_url: "https://oauth2.googleapis.com/revoke".into(),
            api_base: "https://www.googleapis.com".into(),
            securetoken_jwks_url:
                "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com"
                    .into(),
        }
    }
}

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,

    // ── Google OAuth client ─────────────────────────────────────────────
    pub google_client_id: String,
    pub google_client_secret: String,
    /// Must match the redirect URI registered in Google Cloud and used by the frontend.
    pub google_redirect_uri: String,
    pub google: GoogleEndpoints,
    pub http_timeout_secs: u64,

    // ── Identity ────────────────────────────────────────────────────────
    /// Firebase project whose ID tokens identify callers. `None` runs single-tenant.
    pub firebase_project_id: Option<String>,

    // ── Storage ─────────────────────────────────────────────────────────
    /// PostgreSQL connection string. `None` keeps refresh tokens in memory.
    pub database_url: Option<String>,

    // ── Crypto ──────────────────────────────────────────────────────────
    /// 32-byte base64-encoded master key for AES-256-GCM encryption.
    pub master_key: Option<String>,
    /// 32-byte base64-encoded HMAC key for state parameter signing.
    pub hmac_secret: Option<String>,
}

pub const DEFAULT_CORS_ORIGINS: [&str; 2] = [
    "http://localhost:5173",
    "https://frontend-google-auth.onrender.com",
];

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = GoogleEndpoints::default();

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "5000".into())
                .parse()
                .context("Invalid PORT")?,
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect()),

            google_client_id: std::env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID is required")?,
            google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET is required")?,
            google_redirect_uri: std::env::var("GOOGLE_REDIRECT_URI")
                .context("GOOGLE_REDIRECT_URI is required")?,
            google: GoogleEndpoints {
                auth_url: std::env::var("GOOGLE_AUTH_URL").unwrap_or(defaults.auth_url),
                token_url: std::env::var("GOOGLE_TOKEN_URL").unwrap_or(defaults.token_url),
                revoke_url: std::env::var("GOOGLE_REVOKE_URL").unwrap_or(defaults.revoke_url),
                api_base: std::env::var("GOOGLE_API_BASE").unwrap_or(defaults.api_base),
                securetoken_jwks_url: std::env::var("FIREBASE_JWKS_URL")
                    .unwrap_or(defaults.securetoken_jwks_url),
            },
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .context("Invalid HTTP_TIMEOUT_SECS")?,

            firebase_project_id: non_empty_var("FIREBASE_PROJECT_ID"),
            database_url: non_empty_var("DATABASE_URL"),
            master_key: non_empty_var("MASTER_KEY"),
            hmac_secret: non_empty_var("HMAC_SECRET"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_empty_entries_dropped() {
        let origins = parse_origins(" http://localhost:5173/ ,, https://app.example.com");
        assert_eq!(origins, vec!["http://localhost:5173", "https://app.example.com"]);
    }

    #[test]
    fn default_endpoints_point_at_google() {
        let endpoints = GoogleEndpoints::default();
        assert!(endpoints.token_url.starts_with("https://oauth2.googleapis.com"));
        assert!(endpoints.api_base.starts_with("https://www.googleapis.com"));
    }
}
