use serde::Deserialize;

/// Classification of a failed Google API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The access token was rejected (HTTP 401). Worth a refresh.
    Unauthorized,
    /// Google answered with any other non-success status.
    Upstream,
    /// The request never got an answer (connect error, timeout).
    Network,
    /// The answer could not be decoded.
    InvalidResponse,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Upstream => "upstream",
            Self::Network => "network",
            Self::InvalidResponse => "invalid_response",
        }
    }
}

/// A failed Drive/Calendar call, carrying the upstream status instead of
/// leaving callers to guess from the message text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    kind: FetchErrorKind,
    status: Option<u16>,
    message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failure means the access token is expired or invalid.
    pub fn is_unauthorized(&self) -> bool {
        self.kind == FetchErrorKind::Unauthorized
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            "request timeout".to_string()
        } else if e.is_connect() {
            format!("connection failed: {e}")
        } else {
            format!("request failed: {e}")
        };
        Self::new(FetchErrorKind::Network, None, message)
    }

    /// Build an error from a non-success status and its raw body.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let kind = if status == reqwest::StatusCode::UNAUTHORIZED {
            FetchErrorKind::Unauthorized
        } else {
            FetchErrorKind::Upstream
        };
        Self::new(kind, Some(status.as_u16()), api_error_message(status, body))
    }
}

// Google's JSON error envelope: {"error": {"code": 401, "message": "...", "status": "UNAUTHENTICATED"}}
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        if let Some(message) = envelope.error.message.filter(|m| !m.is_empty()) {
            return message;
        }
    }
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {body}", status.as_u16())
    }
}
