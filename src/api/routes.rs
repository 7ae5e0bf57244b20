//! Route handlers.
//!
//! All `/api` handlers receive `SharedState` via Axum state extraction and
//! resolve the calling user before touching the token store.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::auth::UserId;
use crate::error::RelayError;
use crate::providers::RELAY_SCOPES;
use crate::relay::{call_with_refresh, Fetched};
use crate::SharedState;

/// How long a signed OAuth `state` stays valid.
const STATE_TTL_SECS: i64 = 600;

// =============================================================================
// Routers
// =============================================================================

pub fn root_router() -> Router {
    Router::new().route("/", get(liveness))
}

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── Account linking ──────────────────────────────────────────────
        .route("/auth/google/url", get(google_auth_url))
        .route("/auth/google/callback", post(google_callback))
        .route("/auth/google/disconnect", post(google_disconnect))
        // ── Relayed reads ────────────────────────────────────────────────
        .route("/drive/files", post(drive_files))
        .route("/calendar/events", post(calendar_events))
        .with_state(state)
}

// =============================================================================
// Request bodies
// =============================================================================

/// JSON request body that never rejects: an empty, unreadable or non-JSON
/// body (or a missing `Content-Type`) yields `T::default()`, so the handler's
/// own validation answers with the usual JSON error.
struct JsonBody<T>(T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.unwrap_or_default();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }

        match serde_json::from_slice(&bytes) {
            Ok(body) => Ok(Self(body)),
            Err(e) => {
                debug!("Ignoring unparseable request body: {e}");
                Ok(Self(T::default()))
            }
        }
    }
}

// =============================================================================
// Health
// =============================================================================

async fn liveness() -> &'static str {
    "Backend funcionando correctamente 🚀"
}

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "google-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Account linking
// =============================================================================

/// GET /api/auth/google/url: Consent URL for linking the caller's Google account.
async fn google_auth_url(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Value>, RelayError> {
    let user = state.identity.resolve(&headers).await?;

    // State parameter: userId:timestamp
    let timestamp = Utc::now().timestamp();
    let signed_state = state.crypto.sign_state(&format!("{user}:{timestamp}"))?;

    let scopes: Vec<String> = RELAY_SCOPES.iter().map(|s| s.to_string()).collect();
    let url = state
        .provider
        .auth_url(&scopes, &signed_state, &state.config.google_redirect_uri);

    Ok(Json(json!({ "url": url })))
}

#[derive(Default, Deserialize)]
struct CallbackBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackResponse {
    access_token: String,
    /// Epoch milliseconds.
    expiry_date: Option<i64>,
}

/// POST /api/auth/google/callback: Exchange an authorization code for tokens.
async fn google_callback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<CallbackBody>,
) -> Result<Json<CallbackResponse>, RelayError> {
    let code = body
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or(RelayError::MissingCode)?;

    let user = state.identity.resolve(&headers).await?;

    if let Some(signed) = body.state.as_deref().filter(|s| !s.is_empty()) {
        check_state(&state, signed, &user, Utc::now().timestamp())?;
    }

    let issued_at = Utc::now();
    let tokens = state
        .provider
        .exchange_code(&code, &state.config.google_redirect_uri)
        .await
        .map_err(|e| {
            warn!("Code exchange with {} failed: {e}", state.provider.id());
            e
        })?;

    if let Some(refresh_token) = tokens.refresh_token.as_deref() {
        state.store.put(&user, refresh_token).await?;
        info!("Refresh token stored for user {user}");
    } else {
        info!("Code exchange for user {user} returned no refresh token; keeping the stored one");
    }

    Ok(Json(CallbackResponse {
        expiry_date: tokens
            .expires_at(issued_at)
            .map(|at| at.timestamp_millis()),
        access_token: tokens.access_token,
    }))
}

/// Verify a signed `userId:timestamp` state against the calling user.
fn check_state(
    state: &SharedState,
    signed: &str,
    user: &UserId,
    now: i64,
) -> Result<(), RelayError> {
    let payload = state.crypto.verify_state(signed)?;

    // User ids may contain ':', the timestamp never does.
    let (state_user, timestamp) = payload
        .rsplit_once(':')
        .ok_or_else(|| RelayError::InvalidState("malformed state".into()))?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| RelayError::InvalidState("invalid timestamp in state".into()))?;

    if state_user != user.as_str() {
        return Err(RelayError::InvalidState("state issued to another user".into()));
    }
    if now - timestamp > STATE_TTL_SECS {
        return Err(RelayError::InvalidState("OAuth session expired".into()));
    }

    Ok(())
}

/// POST /api/auth/google/disconnect: Forget (and revoke) the caller's refresh token.
async fn google_disconnect(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Value>, RelayError> {
    let user = state.identity.resolve(&headers).await?;

    let removed = state.store.remove(&user).await?;
    if let Some(refresh_token) = removed.as_deref() {
        // The local copy is already gone; a failed revoke only leaves the grant
        // to expire on Google's side.
        if let Err(e) = state.provider.revoke(refresh_token).await {
            warn!("Revoking refresh token for user {user} failed: {e}");
        }
        info!("Google account disconnected for user {user}");
    }

    Ok(Json(json!({ "disconnected": removed.is_some() })))
}

// =============================================================================
// Relayed reads
// =============================================================================

#[derive(Default, Deserialize)]
struct ResourceBody {
    #[serde(default, rename = "accessToken")]
    access_token: Option<String>,
}

impl ResourceBody {
    fn into_access_token(self) -> Result<String, RelayError> {
        self.access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(RelayError::MissingAccessToken)
    }
}

/// POST /api/drive/files: First page of the caller's Drive files.
async fn drive_files(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<ResourceBody>,
) -> Result<Json<Value>, RelayError> {
    let access_token = body.into_access_token()?;
    let user = state.identity.resolve(&headers).await?;

    let google = &state.google;
    let fetched = call_with_refresh(
        state.provider.as_ref(),
        state.store.get(&user),
        &access_token,
        move |token| async move { google.list_drive_files(&token).await },
    )
    .await?;

    relayed_response(&state, &user, "files", fetched).await
}

/// POST /api/calendar/events: The caller's next events on the primary calendar.
async fn calendar_events(
    State(state): State<SharedState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<ResourceBody>,
) -> Result<Json<Value>, RelayError> {
    let access_token = body.into_access_token()?;
    let user = state.identity.resolve(&headers).await?;

    let now = Utc::now();
    let google = &state.google;
    let fetched = call_with_refresh(
        state.provider.as_ref(),
        state.store.get(&user),
        &access_token,
        move |token| async move { google.list_upcoming_events(&token, now).await },
    )
    .await?;

    relayed_response(&state, &user, "events", fetched).await
}

/// `{<key>: data}` plus `newAccessToken` when a refresh happened. Persists a
/// rotated refresh token first.
async fn relayed_response<T: Serialize>(
    state: &SharedState,
    user: &UserId,
    key: &str,
    fetched: Fetched<T>,
) -> Result<Json<Value>, RelayError> {
    if let Some(rotated) = fetched.rotated_refresh_token.as_deref() {
        state.store.put(user, rotated).await?;
        info!("Rotated refresh token stored for user {user}");
    }

    let data = serde_json::to_value(&fetched.data)
        .map_err(|e| RelayError::Internal(format!("failed to encode response: {e}")))?;

    let mut body = Map::new();
    body.insert(key.to_string(), data);
    if let Some(new_access_token) = fetched.new_access_token {
        body.insert("newAccessToken".into(), Value::String(new_access_token));
    }

    Ok(Json(Value::Object(body)))
}
