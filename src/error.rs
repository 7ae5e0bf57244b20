use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::google::FetchError;

/// Unified error type for the relay.
///
/// Client-facing messages are in Spanish to match the frontend that consumes
/// them; the `details` field carries the diagnostic string.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // ── Input ───────────────────────────────────────────────────────────
    #[error("missing authorization code")]
    MissingCode,

    #[error("missing access token")]
    MissingAccessToken,

    #[error("invalid OAuth state: {0}")]
    InvalidState(String),

    // ── Identity ────────────────────────────────────────────────────────
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    // ── Google ──────────────────────────────────────────────────────────
    #[error("{0}")]
    ProviderExchangeFailed(String),

    #[error("REFRESH_FAILED: {0}")]
    RefreshFailed(String),

    #[error("API_CALL_FAILED: {0}")]
    ApiCallFailed(FetchError),

    #[error("Google provider error: {0}")]
    ProviderError(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for RelayError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        RelayError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for RelayError {
    fn from(e: anyhow::Error) -> Self {
        RelayError::Internal(e.to_string())
    }
}

impl RelayError {
    /// HTTP status and client-facing `error` message.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            RelayError::MissingCode => (
                StatusCode::BAD_REQUEST,
                "Falta el código de autorización.".into(),
            ),
            RelayError::MissingAccessToken => (
                StatusCode::UNAUTHORIZED,
                "No se proporcionó Access Token.".into(),
            ),
            RelayError::InvalidState(_) => {
                (StatusCode::BAD_REQUEST, "Parámetro state inválido.".into())
            }
            RelayError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "No autenticado.".into()),
            RelayError::ProviderExchangeFailed(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Fallo el intercambio de tokens con Google: {detail}"),
            ),
            RelayError::RefreshFailed(_) => (
                StatusCode::UNAUTHORIZED,
                "Fallo el refresco. Vuelve a conectar.".into(),
            ),
            RelayError::ApiCallFailed(e) if e.is_unauthorized() => (
                StatusCode::UNAUTHORIZED,
                "Token inválido o expirado. Necesita ser refrescado.".into(),
            ),
            RelayError::ApiCallFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error al obtener datos de Google.".into(),
            ),
            RelayError::ProviderError(_) => (
                StatusCode::BAD_GATEWAY,
                "Error de comunicación con Google.".into(),
            ),
            RelayError::Database(_) | RelayError::CryptoError(_) | RelayError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error interno del servidor.".into(),
            ),
        }
    }

    /// Diagnostic string for the `details` field, when the variant carries one.
    fn details(&self) -> Option<String> {
        match self {
            RelayError::MissingCode
            | RelayError::MissingAccessToken
            | RelayError::ProviderExchangeFailed(_) => None,
            RelayError::Unauthenticated(reason) => Some(reason.clone()),
            RelayError::RefreshFailed(_) | RelayError::ApiCallFailed(_) => Some(self.to_string()),
            // Internal failures stay in the logs.
            RelayError::InvalidState(_)
            | RelayError::ProviderError(_)
            | RelayError::Database(_)
            | RelayError::CryptoError(_)
            | RelayError::Internal(_) => None,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::debug!("request rejected: {self}");
        }

        let body = match self.details() {
            Some(details) => json!({ "error": message, "details": details }),
            None => json!({ "error": message }),
        };

        (status, axum::Json(body)).into_response()
    }
}
