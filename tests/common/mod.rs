//! Shared harness: the relay router wired to a wiremock stand-in for Google.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::MockServer;

use google_relay::auth::{FirebaseVerifier, IdentityVerifier, JwksKeyStore};
use google_relay::config::{Config, GoogleEndpoints};
use google_relay::crypto::CryptoEngine;
use google_relay::google::GoogleApiClient;
use google_relay::providers::GoogleProvider;
use google_relay::store::{MemoryTokenStore, TokenStore};
use google_relay::{api, AppState, SharedState};

pub const FIREBASE_PROJECT: &str = "demo-project";
const TEST_KEY_PEM: &str = include_str!("../fixtures/firebase_test_key.pem");
const TEST_JWKS: &str = include_str!("../fixtures/firebase_test_jwks.json");

pub struct TestRelay {
    pub google: MockServer,
    pub state: SharedState,
    pub router: Router,
}

pub enum Identity {
    SingleTenant,
    Firebase,
}

impl TestRelay {
    pub async fn start() -> Self {
        Self::start_with(Identity::SingleTenant).await
    }

    pub async fn start_with(identity: Identity) -> Self {
        Self::build(identity, Box::new(MemoryTokenStore::new())).await
    }

    /// Single-tenant relay backed by `store`.
    pub async fn start_with_store(store: Box<dyn TokenStore>) -> Self {
        Self::build(Identity::SingleTenant, store).await
    }

    async fn build(identity: Identity, store: Box<dyn TokenStore>) -> Self {
        let google = MockServer::start().await;
        let uri = google.uri();

        let endpoints = GoogleEndpoints {
            auth_url: format!("{uri}/o/oauth2/v2/auth"),
            token_url: format!("{uri}/token"),
            revoke_url: format!("{uri}/revoke"),
            api_base: uri.clone(),
            securetoken_jwks_url: format!("{uri}/jwks"),
        };

        let config = Config {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec!["http://localhost:5173".into()],
            google_client_id: "test-client-id".into(),
            google_client_secret: "test-client-secret".into(),
            google_redirect_uri: "http://localhost:5173/google-callback".into(),
            google: endpoints.clone(),
            http_timeout_secs: 5,
            firebase_project_id: match identity {
                Identity::SingleTenant => None,
                Identity::Firebase => Some(FIREBASE_PROJECT.into()),
            },
            database_url: None,
            master_key: None,
            hmac_secret: None,
        };

        let http = reqwest::Client::new();
        let identity = match identity {
            Identity::SingleTenant => IdentityVerifier::SingleTenant,
            Identity::Firebase => IdentityVerifier::Firebase(FirebaseVerifier::new(
                FIREBASE_PROJECT,
                JwksKeyStore::new(endpoints.securetoken_jwks_url.clone(), http.clone()),
            )),
        };

        let state: SharedState = Arc::new(AppState {
            provider: Box::new(GoogleProvider::new(
                config.google_client_id.clone(),
                config.google_client_secret.clone(),
                endpoints,
                http.clone(),
            )),
            google: GoogleApiClient::new(http, uri),
            config,
            store,
            crypto: Arc::new(CryptoEngine::ephemeral().expect("ephemeral crypto")),
            identity,
        });

        let router = api::router(state.clone());
        Self {
            google,
            state,
            router,
        }
    }

    pub async fn get(&self, path: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().method("GET").uri(path);
        if let Some(token) = bearer {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    /// POST with no body and no `Content-Type`.
    pub async fn post_empty(&self, path: &str) -> (StatusCode, Value) {
        let req = Request::builder().method("POST").uri(path);
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn post_raw(&self, path: &str, content_type: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", content_type);
        self.send(req.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post(&self, path: &str, body: Value, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = bearer {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        self.send(req.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn upstream_requests(&self) -> usize {
        self.google
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

/// JWKS document matching the private key used by [`firebase_id_token`].
pub fn test_jwks() -> Value {
    serde_json::from_str(TEST_JWKS).unwrap()
}

/// A Firebase-style ID token for `uid`, signed with the fixture key.
pub fn firebase_id_token(uid: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("test-key-1".into());

    encode(
        &header,
        &json!({
            "iss": format!("https://securetoken.google.com/{FIREBASE_PROJECT}"),
            "aud": FIREBASE_PROJECT,
            "sub": uid,
            "iat": now,
            "exp": now + 3600,
        }),
        &EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).unwrap(),
    )
    .unwrap()
}

pub fn token_response(access_token: &str, refresh_token: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "expires_in": 3599,
        "token_type": "Bearer",
        "scope": "https://www.googleapis.com/auth/drive.readonly https://www.googleapis.com/auth/calendar.readonly",
    });
    if let Some(rt) = refresh_token {
        body["refresh_token"] = json!(rt);
    }
    body
}

pub fn unauthorized_body(message: &str) -> Value {
    json!({ "error": { "code": 401, "message": message, "status": "UNAUTHENTICATED" } })
}
