//! Presentation-ready session record.

use serde::{Deserialize, Serialize};

use crate::status::ContentStatus;

/// One scheduled screening, joined and derived from up to six local
/// collections. Ephemeral: rebuilt on every projection call; only the
/// content status fields are ever mutated in place (optimistic patch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSession {
    pub id: String,
    pub hall_name: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    /// Start + movie duration + whole ad minutes, calendar-safe.
    pub end_time: String,
    pub duration_minutes: i64,
    /// Commercial ads plus embedded trailers, in seconds.
    pub ad_seconds: i64,
    pub age_limit: Option<String>,
    pub movie_title: String,
    pub dcp_name: String,
    pub format: String,
    pub ticket_count: i64,
    pub poster: Option<String>,
    pub content_status: ContentStatus,
    /// Epoch milliseconds of the last status change.
    pub status_updated_at: i64,
    pub distributor: String,
    /// Credits-display offsets, passed through from the spreadsheet.
    pub credits_offset: Option<String>,
    pub credits_end_offset: Option<String>,
}
