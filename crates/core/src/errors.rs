//! Shared error type for dashboard operations.

use thiserror::Error;

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (refused connection, DNS, broken pipe).
    #[error("Network error: {0}")]
    Network(String),

    /// All attempts of a request exhausted their per-attempt timeout.
    #[error("Request timed out after {attempts} attempts ({timeout_ms} ms each)")]
    Timeout { attempts: u32, timeout_ms: u64 },

    /// Non-success HTTP response surfaced to the caller.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Local durable store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rejected input (bad URL, malformed health response, ...).
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True when the remote rejected a schema or request shape outright
    /// (creating the table again will not help until reconfiguration).
    pub fn is_schema_rejection(&self) -> bool {
        matches!(self.status_code(), Some(422) | Some(403) | Some(405))
    }
}
