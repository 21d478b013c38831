//! Error types for the keyscope-client crate.
//!
//! Every failure the backend can produce is normalized into [`ClientError`] so
//! callers never have to inspect raw HTTP responses.

use reqwest::StatusCode;
use serde_json::Value;

/// Unified error type for backend requests
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend rejected request: {0}")]
    Rejected(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn status(status: StatusCode, body: &str) -> Self {
        Self::Status {
            status: status.as_u16(),
            message: error_message(status, body),
        }
    }

    /// HTTP status code, if the backend answered at all.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NOT_FOUND.as_u16())
    }
}

/// Extract a human readable message from an error response body.
///
/// Prefers the backend's `error` or `message` JSON field, then the raw body,
/// then the status code's canonical reason.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        for field in ["error", "message"] {
            if let Some(Value::String(msg)) = obj.get(field)
                && !msg.trim().is_empty()
            {
                return msg.trim().to_string();
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .map_or_else(|| status.as_u16().to_string(), str::to_string)
}

pub type Result<T> = std::result::Result<T, ClientError>;
