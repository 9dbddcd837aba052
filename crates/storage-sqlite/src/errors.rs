//! Error types for the SQLite storage crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid stored payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Blocking task failed: {0}")]
    Join(String),
}

impl From<StorageError> for kinodesk_core::Error {
    fn from(err: StorageError) -> Self {
        kinodesk_core::Error::storage(err.to_string())
    }
}
