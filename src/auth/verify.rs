//! Caller identity: Firebase ID token verification.
//!
//! The frontend signs users in with Firebase email/password auth and sends
//! the resulting ID token as `Authorization: Bearer <token>`. The `sub`
//! claim becomes the key under which that user's Google refresh token is
//! stored.

use std::fmt;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::RelayError;

// ─────────────────────────────────────────────────────────────────────────────
// UserId
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of the user a refresh token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Principal used for every caller when no identity provider is configured.
    pub const SINGLE_TENANT: &'static str = "default";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn single_tenant() -> Self {
        Self::new(Self::SINGLE_TENANT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JWKS Cache: Fetches and caches Google securetoken signing keys
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Deserialize, Clone)]
struct JwkKey {
    kid: String,
    kty: String,
    n: String, // RSA modulus
    e: String, // RSA exponent
}

struct JwksCache {
    keys: Vec<JwkKey>,
    fetched_at: Instant,
}

/// Minimum spacing between refetches caused by an unknown `kid`.
const UNKNOWN_KID_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

/// Thread-safe JWKS key cache
pub struct JwksKeyStore {
    cache: RwLock<Option<JwksCache>>,
    jwks_url: String,
    http: reqwest::Client,
    cache_ttl: Duration,
    refetch_interval: Duration,
}

impl JwksKeyStore {
    pub fn new(jwks_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            cache: RwLock::new(None),
            jwks_url: jwks_url.into(),
            http,
            cache_ttl: Duration::from_secs(3600),
            refetch_interval: UNKNOWN_KID_REFETCH_INTERVAL,
        }
    }

    /// Get the decoding key for a specific kid, fetching/refreshing JWKS as needed
    async fn get_decoding_key(&self, kid: &str) -> Result<DecodingKey, RelayError> {
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                let age = cached.fetched_at.elapsed();
                if age < self.cache_ttl {
                    if let Some(key) = cached.keys.iter().find(|k| k.kid == kid) {
                        return Self::jwk_to_decoding_key(key);
                    }
                    // Anyone can send a made-up kid; refetch at most once per interval.
                    if age < self.refetch_interval {
                        return Err(Self::unknown_kid(kid));
                    }
                }
            }
        }

        // Cache miss or expired. Google rotates these keys every few hours.
        self.refresh_keys().await?;

        let cache = self.cache.read().await;
        if let Some(ref cached) = *cache {
            if let Some(key) = cached.keys.iter().find(|k| k.kid == kid) {
                return Self::jwk_to_decoding_key(key);
            }
        }

        Err(Self::unknown_kid(kid))
    }

    fn unknown_kid(kid: &str) -> RelayError {
        RelayError::Unauthenticated(format!("no signing key found for kid '{kid}'"))
    }

    async fn refresh_keys(&self) -> Result<(), RelayError> {
        tracing::info!("Fetching JWKS keys from {}", self.jwks_url);

        let resp = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| RelayError::Internal(format!("JWKS fetch failed: {e}")))?;

        let jwks: JwksResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Internal(format!("JWKS parse failed: {e}")))?;

        tracing::info!("Cached {} JWKS keys", jwks.keys.len());

        let mut cache = self.cache.write().await;
        *cache = Some(JwksCache {
            keys: jwks.keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }

    fn jwk_to_decoding_key(key: &JwkKey) -> Result<DecodingKey, RelayError> {
        if key.kty != "RSA" {
            return Err(RelayError::Unauthenticated(format!(
                "unsupported key type: {}",
                key.kty
            )));
        }

        DecodingKey::from_rsa_components(&key.n, &key.e)
            .map_err(|e| RelayError::Unauthenticated(format!("invalid RSA key components: {e}")))
    }

    /// Pre-warm the cache on startup
    pub async fn warm_cache(&self) -> Result<(), RelayError> {
        self.refresh_keys().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Firebase ID token validation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[allow(dead_code)]
    exp: i64,
}

/// Verifies Firebase ID tokens issued for one project.
pub struct FirebaseVerifier {
    project_id: String,
    jwks: JwksKeyStore,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>, jwks: JwksKeyStore) -> Self {
        Self {
            project_id: project_id.into(),
            jwks,
        }
    }

    /// Validate signature, issuer, audience and expiry; return the user id.
    pub async fn verify(&self, id_token: &str) -> Result<UserId, RelayError> {
        let header = decode_header(id_token)
            .map_err(|e| RelayError::Unauthenticated(format!("invalid JWT header: {e}")))?;

        if header.alg != Algorithm::RS256 {
            return Err(RelayError::Unauthenticated(format!(
                "unsupported JWT algorithm: {:?} (expected RS256)",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| RelayError::Unauthenticated("JWT header missing 'kid'".into()))?;

        let decoding_key = self.jwks.get_decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation.set_audience(&[&self.project_id]);
        validation.validate_exp = true;

        let token_data = decode::<FirebaseClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    RelayError::Unauthenticated("ID token expired".into())
                }
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    RelayError::Unauthenticated("invalid issuer".into())
                }
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    RelayError::Unauthenticated("invalid audience".into())
                }
                _ => RelayError::Unauthenticated(format!("JWT verification failed: {e}")),
            })?;

        let sub = token_data.claims.sub;
        if sub.is_empty() {
            return Err(RelayError::Unauthenticated("ID token has empty 'sub'".into()));
        }

        Ok(UserId::new(sub))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request identity
// ─────────────────────────────────────────────────────────────────────────────

/// How the relay decides who is calling.
pub enum IdentityVerifier {
    /// Every request must carry a valid Firebase ID token.
    Firebase(FirebaseVerifier),
    /// No identity provider configured: all callers share one principal.
    SingleTenant,
}

impl IdentityVerifier {
    /// Resolve the calling user from the request headers.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<UserId, RelayError> {
        match self {
            IdentityVerifier::SingleTenant => Ok(UserId::single_tenant()),
            IdentityVerifier::Firebase(verifier) => {
                let token = bearer_token(headers).ok_or_else(|| {
                    RelayError::Unauthenticated("missing bearer ID token".into())
                })?;
                verifier.verify(token).await
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn headers_with(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(auth).unwrap());
        headers
    }

    fn firebase() -> IdentityVerifier {
        // Unroutable JWKS URL: none of these tests may reach the network.
        let jwks = JwksKeyStore::new("http://127.0.0.1:9/jwks", reqwest::Client::new());
        IdentityVerifier::Firebase(FirebaseVerifier::new("demo-project", jwks))
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers_with("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers_with("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn single_tenant_ignores_headers() {
        let user = IdentityVerifier::SingleTenant
            .resolve(&HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(user.as_str(), UserId::SINGLE_TENANT);
    }

    #[tokio::test]
    async fn firebase_requires_a_bearer_token() {
        let err = firebase().resolve(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, RelayError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn firebase_rejects_garbage_tokens() {
        let err = firebase()
            .resolve(&headers_with("Bearer not-a-jwt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn firebase_rejects_symmetric_algorithms_before_fetching_keys() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "uid-1", "exp": 4_102_444_800i64 }),
            &EncodingKey::from_secret(b"attacker-chosen"),
        )
        .unwrap();

        let err = firebase()
            .resolve(&headers_with(&format!("Bearer {token}")))
            .await
            .unwrap_err();
        match err {
            RelayError::Unauthenticated(reason) => assert!(reason.contains("RS256")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_kids_do_not_refetch_keys_on_every_request() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let google = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                include_str!("../../tests/fixtures/firebase_test_jwks.json"),
                "application/json",
            ))
            .expect(1)
            .mount(&google)
            .await;

        let jwks = JwksKeyStore::new(format!("{}/jwks", google.uri()), reqwest::Client::new());
        for _ in 0..5 {
            assert!(matches!(
                jwks.get_decoding_key("made-up").await,
                Err(RelayError::Unauthenticated(_))
            ));
        }
        assert!(jwks.get_decoding_key("test-key-1").await.is_ok());
    }
}
