//! Error types for the SDK.

use thiserror::Error;

/// SDK error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Credential missing, invalid or expired (401/403).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server rejected the request (400).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The language model could not produce a reply (502).
    #[error("AI service error: {0}")]
    Provider(String),

    /// API returned any other error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    #[cfg(feature = "http-client")]
    Http(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller has to sign in again.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Build the error for a non-success status and its response body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<crate::types::ErrorBody>(body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| body.to_string());
        match status {
            401 | 403 => Self::Auth(message),
            400 => Self::Validation(message),
            502 => Self::Provider(message),
            _ => Self::Api { status, message },
        }
    }
}

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;
