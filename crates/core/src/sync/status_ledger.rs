//! The remote content-status ledger and its merge into local shows.
//!
//! The backend hosts one row per movie (keyed by normalized title) holding
//! an optional global status plus per-hall override columns. The remote
//! table is the single source of truth: it is read back on every sync and
//! overwritten wholesale into local show records, never merged back.

use std::collections::HashMap;

use serde_json::Value;

use crate::sanitize::{coerce_i64, coerce_string};
use crate::status::ContentStatus;
use crate::titles::normalize_movie_title;

/// Versioned remote table names. The suffix is a migration guard: a schema
/// change bumps the name instead of issuing an ALTER against live clients.
pub const STATUS_TABLE: &str = "cinema_content_statuses_v3";
pub const SETTINGS_TABLE: &str = "cinema_app_settings_v2";

pub const STATUS_KEY_COLUMN: &str = "movies_name";
pub const GLOBAL_STATUS_COLUMN: &str = "status_global";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
const HALL_COLUMN_PREFIX: &str = "halls_";

pub fn hall_column(hall_id: i64) -> String {
    format!("{}{}", HALL_COLUMN_PREFIX, hall_id)
}

/// Parsed remote row: at most one global value, zero-or-more hall overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteStatusRecord {
    pub global: Option<ContentStatus>,
    pub halls: HashMap<i64, ContentStatus>,
    pub updated_at: i64,
}

impl RemoteStatusRecord {
    /// Hall-specific override wins over the global value; a record with
    /// neither yields `None` (the show keeps whatever status it had).
    pub fn resolve(&self, hall_id: Option<i64>) -> Option<ContentStatus> {
        if let Some(hall_id) = hall_id {
            if let Some(status) = self.halls.get(&hall_id) {
                return Some(*status);
            }
        }
        self.global
    }
}

/// Build the title-keyed lookup from raw remote rows. Rows without a key
/// or with unparseable status values are skipped column-wise, not rejected.
pub fn parse_status_rows(rows: Vec<Value>) -> HashMap<String, RemoteStatusRecord> {
    let mut lookup = HashMap::new();
    for row in rows {
        let Some(map) = row.as_object() else { continue };
        let Some(key) = map.get(STATUS_KEY_COLUMN).and_then(coerce_string) else {
            continue;
        };

        let mut record = RemoteStatusRecord {
            updated_at: map.get(UPDATED_AT_COLUMN).and_then(coerce_i64).unwrap_or(0),
            ..RemoteStatusRecord::default()
        };
        for (column, value) in map {
            let Some(text) = value.as_str() else { continue };
            let Some(status) = ContentStatus::parse(text) else {
                continue;
            };
            if column == GLOBAL_STATUS_COLUMN {
                record.global = Some(status);
            } else if let Some(hall_id) = column
                .strip_prefix(HALL_COLUMN_PREFIX)
                .and_then(|raw| raw.parse::<i64>().ok())
            {
                record.halls.insert(hall_id, status);
            }
        }
        lookup.insert(key, record);
    }
    lookup
}

/// A status change produced by the merge, addressed by show record key.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPatch {
    pub show_key: String,
    pub status: ContentStatus,
    pub updated_at: i64,
}

/// Merge the remote ledger into shows, in memory. For every show the
/// movie's normalized title is looked up; resolution is hall-specific over
/// global, and a miss leaves the show's existing status untouched (never
/// downgraded to `no_status`). Returns the patches that actually changed
/// something; `shows` is mutated in place.
pub fn apply_statuses(
    shows: &mut [Value],
    movies: &[Value],
    lookup: &HashMap<String, RemoteStatusRecord>,
) -> Vec<StatusPatch> {
    let titles_by_movie: HashMap<i64, String> = movies
        .iter()
        .filter_map(|movie| {
            let map = movie.as_object()?;
            let id = map.get("id").and_then(coerce_i64)?;
            let name = map
                .get("name")
                .or_else(|| map.get("title"))
                .and_then(coerce_string)?;
            Some((id, normalize_movie_title(&name)))
        })
        .collect();

    let mut patches = Vec::new();
    for show in shows.iter_mut() {
        let Some(map) = show.as_object_mut() else {
            continue;
        };
        let Some(show_key) = map.get("id").and_then(coerce_i64).map(|id| id.to_string()) else {
            continue;
        };
        let Some(title_key) = map
            .get("movie_id")
            .and_then(coerce_i64)
            .and_then(|movie_id| titles_by_movie.get(&movie_id))
        else {
            continue;
        };
        let Some(record) = lookup.get(title_key) else {
            continue;
        };
        let hall_id = map.get("hall_id").and_then(coerce_i64);
        let Some(status) = record.resolve(hall_id) else {
            continue;
        };

        let current = map
            .get("content_status")
            .and_then(Value::as_str)
            .and_then(ContentStatus::parse);
        if current == Some(status) {
            continue;
        }
        map.insert(
            "content_status".to_string(),
            Value::String(status.as_str().to_string()),
        );
        map.insert(
            "status_updated_at".to_string(),
            Value::from(record.updated_at),
        );
        patches.push(StatusPatch {
            show_key,
            status,
            updated_at: record.updated_at,
        });
    }
    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_global_and_hall_columns() {
        let lookup = parse_status_rows(vec![json!({
            "movies_name": "dune",
            "status_global": "on_storage",
            "halls_5": "ready_hall",
            "halls_7": null,
            "updated_at": 1000
        })]);
        let record = lookup.get("dune").expect("record");
        assert_eq!(record.global, Some(ContentStatus::OnStorage));
        assert_eq!(record.halls.get(&5), Some(&ContentStatus::ReadyHall));
        assert!(!record.halls.contains_key(&7));
        assert_eq!(record.updated_at, 1000);
    }

    #[test]
    fn hall_override_beats_global() {
        let record = RemoteStatusRecord {
            global: Some(ContentStatus::OnStorage),
            halls: HashMap::from([(5, ContentStatus::ReadyHall)]),
            updated_at: 0,
        };
        assert_eq!(record.resolve(Some(5)), Some(ContentStatus::ReadyHall));
        assert_eq!(record.resolve(Some(7)), Some(ContentStatus::OnStorage));
        assert_eq!(record.resolve(None), Some(ContentStatus::OnStorage));
    }

    #[test]
    fn merge_leaves_unmatched_shows_untouched() {
        let mut shows = vec![
            json!({"id": 1, "movie_id": 101, "hall_id": 5, "content_status": "no_keys"}),
            json!({"id": 2, "movie_id": 999, "hall_id": 5}),
        ];
        let movies = vec![
            json!({"id": 101, "name": "Dune"}),
            json!({"id": 999, "name": "Unlisted"}),
        ];
        let lookup = parse_status_rows(vec![json!({
            "movies_name": "dune",
            "halls_5": "ready_hall",
            "updated_at": 42
        })]);

        let patches = apply_statuses(&mut shows, &movies, &lookup);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].show_key, "1");
        assert_eq!(patches[0].status, ContentStatus::ReadyHall);
        assert_eq!(shows[0]["content_status"], json!("ready_hall"));
        assert_eq!(shows[0]["status_updated_at"], json!(42));
        // No ledger row for "unlisted", so the existing (absent) status stays.
        assert!(shows[1].get("content_status").is_none());
    }

    #[test]
    fn record_with_no_matching_entry_does_not_downgrade() {
        let mut shows = vec![json!({
            "id": 1, "movie_id": 101, "hall_id": 9, "content_status": "ready_hall"
        })];
        let movies = vec![json!({"id": 101, "name": "Dune"})];
        // Ledger row exists but has neither halls_9 nor a global value.
        let lookup = parse_status_rows(vec![json!({
            "movies_name": "dune",
            "halls_5": "download_hall",
            "updated_at": 7
        })]);

        let patches = apply_statuses(&mut shows, &movies, &lookup);
        assert!(patches.is_empty());
        assert_eq!(shows[0]["content_status"], json!("ready_hall"));
    }

    #[test]
    fn unchanged_status_produces_no_patch() {
        let mut shows = vec![json!({
            "id": 1, "movie_id": 101, "hall_id": 5, "content_status": "ready_hall"
        })];
        let movies = vec![json!({"id": 101, "name": "Dune"})];
        let lookup = parse_status_rows(vec![json!({
            "movies_name": "dune",
            "halls_5": "ready_hall",
            "updated_at": 7
        })]);
        assert!(apply_statuses(&mut shows, &movies, &lookup).is_empty());
    }
}
