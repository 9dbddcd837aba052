//! Local durable store contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::status::ContentStatus;

pub mod collections {
    //! Canonical names of the locally cached collections.

    pub const MOVIES: &str = "movies";
    pub const HALLS: &str = "halls";
    pub const HALL_CATEGORIES: &str = "hall_categories";
    pub const FORMATS: &str = "formats";
    pub const SHOWS: &str = "shows";
    pub const TICKETS: &str = "tickets";
    pub const ADVERTISEMENTS: &str = "advertisements";
    pub const SHEET_ROWS: &str = "sheet_rows";

    pub const ALL: [&str; 8] = [
        MOVIES,
        HALLS,
        HALL_CATEGORIES,
        FORMATS,
        SHOWS,
        TICKETS,
        ADVERTISEMENTS,
        SHEET_ROWS,
    ];
}

/// Meta key under which the last successful sync timestamp (epoch ms) lives.
pub const LAST_SYNC_META_KEY: &str = "last_sync_at";

/// One record headed for the store: a key within its collection, optional
/// index columns (populated for shows), and the sanitized JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub show_date: Option<String>,
    pub hall_id: Option<i64>,
    pub payload: Value,
}

impl StoredRecord {
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            show_date: None,
            hall_id: None,
            payload,
        }
    }
}

/// Per-collection record counts plus the last sync marker, the only window
/// callers get onto sanitization results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    pub counts: BTreeMap<String, i64>,
    pub last_sync_at: Option<i64>,
}

/// Durable keyed store with indexed range queries. Collections are replaced
/// wholesale on sync; only a show's content status is ever patched in place.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Clear-then-bulk-insert. Not transactional across collections.
    async fn replace_collection(&self, collection: &str, records: Vec<StoredRecord>)
        -> Result<()>;

    async fn collection(&self, collection: &str) -> Result<Vec<Value>>;

    async fn shows_for_date(&self, date: &str) -> Result<Vec<Value>>;

    async fn shows_for_hall_date(&self, hall_id: i64, date: &str) -> Result<Vec<Value>>;

    /// Single-record status patch; a missing show is a quiet no-op.
    async fn patch_show_status(
        &self,
        show_key: &str,
        status: ContentStatus,
        updated_at: i64,
    ) -> Result<()>;

    async fn get_meta(&self, key: &str) -> Result<Option<String>>;

    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    async fn stats(&self) -> Result<DbStats>;
}
