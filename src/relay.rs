//! Refresh-on-expiry around a single Google API call.
//!
//! The call is tried with the caller's access token. If Google rejects the
//! token and the user has a stored refresh token, one refresh and one retry
//! follow. Nothing is retried beyond that, and no stored state is touched:
//! the caller gets the new access token (and any rotated refresh token) back
//! and decides what to persist.

use std::future::Future;

use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::google::FetchError;
use crate::providers::OAuthProvider;

/// Result of a relayed call.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    /// Set when the original access token was refreshed along the way.
    pub new_access_token: Option<String>,
    /// Set when the provider issued a refresh token different from the stored one.
    pub rotated_refresh_token: Option<String>,
}

impl<T> Fetched<T> {
    fn first_try(data: T) -> Self {
        Self {
            data,
            new_access_token: None,
            rotated_refresh_token: None,
        }
    }
}

/// Run `fetch` with `access_token`, refreshing and retrying once if Google
/// reports the token as unauthorized and a refresh token is available.
///
/// `stored_refresh_token` is only awaited after a 401, so a broken token
/// store never fails a call made with a still-valid access token.
///
/// Errors:
/// - [`RelayError::ApiCallFailed`] when the first call fails for any other
///   reason, when no refresh token is stored, or when the retry fails.
/// - [`RelayError::RefreshFailed`] when the refresh itself fails. Terminal.
/// - Whatever the store reports if loading the refresh token fails.
pub async fn call_with_refresh<T, F, Fut, L>(
    provider: &dyn OAuthProvider,
    stored_refresh_token: L,
    access_token: &str,
    mut fetch: F,
) -> Result<Fetched<T>, RelayError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
    L: Future<Output = Result<Option<String>, RelayError>>,
{
    let err = match fetch(access_token.to_string()).await {
        Ok(data) => return Ok(Fetched::first_try(data)),
        Err(err) => err,
    };

    let refresh_token = if err.is_unauthorized() {
        stored_refresh_token.await?.filter(|rt| !rt.is_empty())
    } else {
        None
    };
    let Some(refresh_token) = refresh_token else {
        error!(
            "Google API call failed ({}, status {:?}): {err}",
            err.kind().as_str(),
            err.status()
        );
        return Err(RelayError::ApiCallFailed(err));
    };

    warn!("Access token rejected by Google ({err}); refreshing");

    let tokens = provider
        .refresh_token(&refresh_token)
        .await
        .map_err(|e| {
            let e = match e {
                RelayError::RefreshFailed(_) => e,
                other => RelayError::RefreshFailed(other.to_string()),
            };
            error!("Token refresh failed: {e}");
            e
        })?;

    info!("Token refreshed, retrying Google API call");

    let data = fetch(tokens.access_token.clone()).await.map_err(|err| {
        error!("Google API call failed after refresh: {err}");
        RelayError::ApiCallFailed(err)
    })?;

    let rotated_refresh_token = tokens
        .refresh_token
        .filter(|new| !new.is_empty() && *new != refresh_token);

    Ok(Fetched {
        data,
        new_access_token: Some(tokens.access_token),
        rotated_refresh_token,
    })
}
