//! Error taxonomy for the conversation API.
//!
//! Every failure that can reach a client is one of the [`ChatError`] variants.
//! Each variant maps to a distinct HTTP status and a JSON body of the form
//! `{"error": {"kind": "...", "message": "..."}}`, so callers can tell an
//! expired credential apart from a provider outage without parsing text.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failure of the session persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted history could not be encoded or decoded.
    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The backend refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced at the conversation service boundary.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Empty or otherwise invalid input. Rejected before any mutation.
    #[error("{0}")]
    Validation(String),

    /// The completion provider failed, timed out, or returned garbage.
    ///
    /// The user turn has already been persisted when this is returned.
    #[error("provider error: {0}")]
    Provider(String),

    /// The session store could not persist the change.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Missing, malformed, or expired bearer credential.
    #[error("{0}")]
    Auth(String),
}

impl ChatError {
    /// Machine-readable kind used in the JSON error body.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Provider(_) => "provider",
            Self::Storage(_) => "storage",
            Self::Auth(_) => "auth",
        }
    }

    /// HTTP status the error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

/// JSON error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Kind and human-readable message of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
}

/// Build an error response with the standard envelope.
pub fn error_response(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            kind,
            message: message.into(),
        },
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = match &self {
            // Storage details stay in the logs.
            Self::Storage(e) => {
                tracing::error!(name: "storage.failed", error = %e, "Session storage failure");
                "Failed to persist conversation".to_string()
            }
            other => other.to_string(),
        };
        error_response(status, kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ChatError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChatError::Provider("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ChatError::Storage(StorageError::Unavailable("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ChatError::Auth("x".into()).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ChatError::Validation(String::new()).kind(), "validation");
        assert_eq!(ChatError::Auth(String::new()).kind(), "auth");
    }
}
