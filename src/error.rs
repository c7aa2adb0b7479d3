//! Error types for modelgate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for modelgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for modelgate.
///
/// Configuration errors are fatal at startup; everything else is returned to
/// the caller as a structured response. Routing never falls back to a wrong
/// provider on ambiguity; it surfaces one of the errors below instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Unknown provider '{name}'")]
    UnknownProvider { name: String },

    #[error("Provider '{provider}' does not serve model '{model}'")]
    UnknownModel { provider: String, model: String },

    #[error("No route configured for class '{class}' and no default route present")]
    NoRouteConfigured { class: &'static str },

    #[error("Credential acquisition failed: {0}")]
    CredentialAcquisition(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing or invalid API key")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Error::UnknownProvider { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::UnknownModel { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::NoRouteConfigured { .. } => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Error::CredentialAcquisition(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Error::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        // OpenAI-compatible error format
        let body = serde_json::json!({
            "error": {
                "message": message,
                "type": "modelgate_error",
                "code": status.as_u16()
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
