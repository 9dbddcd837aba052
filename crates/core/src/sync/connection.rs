//! Connection state machine and failure classification.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// `idle → pending → {connected | error}`, re-entered on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Pending,
    Connected,
    Error,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Published connection snapshot, readable at any time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub status: ConnectionStatus,
    pub server_version: Option<String>,
    /// Epoch ms of the last completed probe.
    pub last_checked_at: Option<i64>,
    pub last_error: Option<String>,
}

impl ConnectionInfo {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Error,
            last_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Validate the configured server URL before any network call. Only the
/// port can realistically be wrong enough to catch locally: it must parse
/// and fall in [1, 65535].
pub fn validate_server_url(url: &str) -> Result<(), String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err("No server URL configured".to_string());
    }
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    if let Some((_, port)) = authority.rsplit_once(':') {
        match port.parse::<u32>() {
            Ok(p) if (1..=65535).contains(&p) => Ok(()),
            _ => Err(format!("Invalid server port: {}", port)),
        }
    } else {
        Ok(())
    }
}

/// Classify a probe failure into a user-presentable message: connection
/// refused, DNS, validation (422), timeout, or generic.
pub fn describe_connection_error(err: &Error) -> String {
    if err.is_timeout() {
        return format!("Server did not respond: {}", err);
    }
    if err.status_code() == Some(422) {
        return format!("Server rejected the request: {}", err);
    }
    match err {
        Error::Network(message) => {
            let lowered = message.to_lowercase();
            if lowered.contains("refused") {
                "Connection refused: is the server running?".to_string()
            } else if lowered.contains("dns") || lowered.contains("resolve") {
                "Server address could not be resolved".to_string()
            } else {
                format!("Connection failed: {}", message)
            }
        }
        Error::Validation(message) => format!("Invalid server response: {}", message),
        other => format!("Connection failed: {}", other),
    }
}
