//! Error types for the backend client crate.

use thiserror::Error;

/// Result type alias for backend client operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while talking to the cinema management server.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the server
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Every attempt of a request ran out of its per-attempt timeout
    #[error("Request timed out after {attempts} attempts ({timeout_ms} ms each)")]
    Timeout { attempts: u32, timeout_ms: u64 },

    /// Invalid request (bad header value, unconfigured target, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Statuses worth a retry. Server errors are retried, and so are 408 and
/// 429: although they are 4xx answers, both mean "try again later" rather
/// than "your request is wrong". Every other 4xx is permanent and is
/// returned to the caller immediately.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

pub(crate) fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

impl From<BackendError> for kinodesk_core::Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Http(inner) => kinodesk_core::Error::network(inner.to_string()),
            BackendError::Json(inner) => kinodesk_core::Error::Json(inner),
            BackendError::Api { status, message } => kinodesk_core::Error::api(status, message),
            BackendError::Timeout {
                attempts,
                timeout_ms,
            } => kinodesk_core::Error::Timeout {
                attempts,
                timeout_ms,
            },
            BackendError::InvalidRequest(message) => kinodesk_core::Error::validation(message),
        }
    }
}
