//! Read-only clients for the Google Drive and Calendar REST APIs.
//!
//! Every call takes the caller's access token explicitly; nothing here knows
//! about refresh tokens. Failures come back as [`FetchError`] so the retry
//! layer can tell an expired token from any other problem.

mod calendar;
mod drive;
mod error;

pub use calendar::{CalendarEvent, EventTime, CALENDAR_MAX_RESULTS, CALENDAR_WINDOW_HOURS};
pub use drive::{DriveFile, DRIVE_PAGE_SIZE};
pub use error::{FetchError, FetchErrorKind};

use serde::de::DeserializeOwned;
use tracing::debug;

/// Thin JSON client over `googleapis.com`.
#[derive(Debug, Clone)]
pub struct GoogleApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl GoogleApiClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Authenticated GET returning a decoded JSON body.
    async fn get_json<T, Q>(&self, path: &str, access_token: &str, query: &Q) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.api_base, path);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("GET {path} failed with {status}");
            return Err(FetchError::from_status(status, &body));
        }

        resp.json::<T>().await.map_err(|e| {
            FetchError::new(
                FetchErrorKind::InvalidResponse,
                Some(status.as_u16()),
                format!("failed to parse response: {e}"),
            )
        })
    }
}
