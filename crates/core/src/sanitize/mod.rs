//! Normalization of loosely-typed backend payloads.
//!
//! The cinema server is schema-less: every collection may arrive under a
//! different envelope, and the same field shows up under several names
//! depending on which backend version produced it. This module keeps all of
//! that knowledge in declarative alias tables resolved by one generic
//! first-match function, so each entity's quirks stay testable in isolation.
//!
//! Post-condition: every record that survives sanitization has a resolved
//! primary key (numeric for backend entities, a derived normalized-title
//! string for spreadsheet rows). Records that cannot be keyed are dropped.

use serde_json::{Map, Value};

use crate::titles::normalize_movie_title;

pub mod aliases {
    //! Ordered alias lists, first match wins.

    pub const RECORD_ID: &[&str] = &["id", "ID", "Id", "pk"];
    pub const MOVIE_REF: &[&str] = &["movie_id", "movieId", "MovieID", "film_id"];
    pub const HALL_REF: &[&str] = &["hall_id", "hallId", "HallID", "room_id"];
    pub const FORMAT_REF: &[&str] = &["format_id", "formatId", "FormatID"];
    pub const SHOW_REF: &[&str] = &[
        "show_id",
        "showId",
        "ShowID",
        "session_id",
        "sessionId",
    ];
    pub const START_TIME: &[&str] = &["start_time", "startTime", "time", "begin"];
    pub const SHOW_DATE: &[&str] = &["date", "show_date", "day"];
    pub const TICKET_COUNT: &[&str] = &[
        "occupied_count",
        "occupiedCount",
        "Tickets",
        "tickets",
        "count",
        "seats",
    ];
    pub const AD_LIST: &[&str] = &["ads", "items", "advertisements", "blocks"];
    pub const AD_DURATION: &[&str] = &["duration", "duration_seconds", "seconds", "length"];
    pub const SHEET_TITLE: &[&str] = &[
        "movie_title",
        "movieTitle",
        "title",
        "Movie",
        "name",
        "film",
    ];
}

/// Envelope keys tried when a payload is not a bare array.
const ENVELOPE_KEYS: &[&str] = &["data", "items", "result", "rows"];

/// Unwrap a collection payload into an array regardless of envelope shape:
/// bare array, or an object nesting the array under a generic or
/// domain-named key.
pub fn unwrap_collection(payload: Value, domain_key: &str) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in ENVELOPE_KEYS.iter().copied().chain([domain_key]) {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return items;
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// First present alias wins, in table order.
pub fn first_alias<'a>(record: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|key| record.get(*key))
}

/// Coerce a JSON value into an integer: native numbers (floats truncate)
/// and numeric strings both count.
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Coerce a JSON value into a non-empty string.
pub fn coerce_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn resolve_i64(record: &Map<String, Value>, aliases: &[&str]) -> Option<i64> {
    first_alias(record, aliases).and_then(coerce_i64)
}

/// Generic sanitizer for entities keyed by a numeric `id`: resolves the key
/// through the alias table, writes it back under the canonical name, and
/// drops records without one.
pub fn sanitize_keyed(records: Vec<Value>) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|record| {
            let Value::Object(mut map) = record else {
                return None;
            };
            let id = resolve_i64(&map, aliases::RECORD_ID)?;
            map.insert("id".to_string(), Value::from(id));
            Some(Value::Object(map))
        })
        .collect()
}

/// Shows additionally need their movie/hall references and a split
/// date + time, since the projector and the store's date index key on them.
pub fn sanitize_shows(records: Vec<Value>) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|record| {
            let Value::Object(mut map) = record else {
                return None;
            };
            let id = resolve_i64(&map, aliases::RECORD_ID)?;
            map.insert("id".to_string(), Value::from(id));

            if let Some(movie_id) = resolve_i64(&map, aliases::MOVIE_REF) {
                map.insert("movie_id".to_string(), Value::from(movie_id));
            }
            if let Some(hall_id) = resolve_i64(&map, aliases::HALL_REF) {
                map.insert("hall_id".to_string(), Value::from(hall_id));
            }
            if let Some(format_id) = resolve_i64(&map, aliases::FORMAT_REF) {
                map.insert("format_id".to_string(), Value::from(format_id));
            }

            let start = first_alias(&map, aliases::START_TIME)
                .and_then(coerce_string)
                .unwrap_or_default();
            let (date, time) = split_start_time(&start, &map);
            if let Some(date) = date {
                map.insert("date".to_string(), Value::String(date));
            }
            if let Some(time) = time {
                map.insert("time".to_string(), Value::String(time));
            }
            Some(Value::Object(map))
        })
        .collect()
}

/// Derive `YYYY-MM-DD` and `HH:MM` from a start-time string, falling back
/// to an explicit date field for time-only values.
fn split_start_time(start: &str, map: &Map<String, Value>) -> (Option<String>, Option<String>) {
    let fallback_date = first_alias(map, aliases::SHOW_DATE).and_then(coerce_string);
    let trimmed = start.trim();
    if let Some(split_at) = trimmed.find(['T', ' ']) {
        let (date, rest) = trimmed.split_at(split_at);
        let time: String = rest[1..].chars().take(5).collect();
        let date = if date.len() == 10 {
            Some(date.to_string())
        } else {
            fallback_date
        };
        let time = if time.len() == 5 { Some(time) } else { None };
        return (date, time);
    }
    // Time-only value like "19:00".
    if trimmed.len() >= 5 && trimmed.as_bytes().get(2) == Some(&b':') {
        return (fallback_date, Some(trimmed.chars().take(5).collect()));
    }
    (fallback_date, None)
}

/// Tickets are keyed by show, not by their own id, and the occupied-seat
/// count hides behind the widest alias set of all entities.
pub fn sanitize_tickets(records: Vec<Value>) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|record| {
            let Value::Object(mut map) = record else {
                return None;
            };
            let show_id = resolve_i64(&map, aliases::SHOW_REF)?;
            let occupied = resolve_i64(&map, aliases::TICKET_COUNT).unwrap_or(0);
            map.insert("show_id".to_string(), Value::from(show_id));
            map.insert("occupied_count".to_string(), Value::from(occupied));
            Some(Value::Object(map))
        })
        .collect()
}

/// Sum ad durations from a possibly doubly-nested ad list: entries either
/// carry a duration themselves or nest another list that does.
fn total_ad_seconds(map: &Map<String, Value>) -> i64 {
    let Some(Value::Array(entries)) = first_alias(map, aliases::AD_LIST) else {
        return first_alias(map, aliases::AD_DURATION)
            .and_then(coerce_i64)
            .unwrap_or(0);
    };
    entries
        .iter()
        .map(|entry| match entry {
            Value::Object(inner) => {
                if let Some(duration) = first_alias(inner, aliases::AD_DURATION).and_then(coerce_i64)
                {
                    duration
                } else {
                    total_ad_seconds(inner)
                }
            }
            other => coerce_i64(other).unwrap_or(0),
        })
        .sum()
}

/// Advertisements: keyed by show, with a precomputed total duration so the
/// projector never has to walk the nested list again.
pub fn sanitize_advertisements(records: Vec<Value>) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|record| {
            let Value::Object(mut map) = record else {
                return None;
            };
            let show_id = resolve_i64(&map, aliases::SHOW_REF)?;
            let total = total_ad_seconds(&map);
            map.insert("show_id".to_string(), Value::from(show_id));
            map.insert("total_seconds".to_string(), Value::from(total));
            Some(Value::Object(map))
        })
        .collect()
}

/// Spreadsheet rows: the one string-keyed entity. The key is the normalized
/// movie title derived from whichever title column the sheet happens to use;
/// rows without a derivable title are skipped.
pub fn sanitize_sheet_rows(records: Vec<Value>) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|record| {
            let Value::Object(mut map) = record else {
                return None;
            };
            let title = first_alias(&map, aliases::SHEET_TITLE).and_then(coerce_string)?;
            let key = normalize_movie_title(&title);
            if key.is_empty() {
                return None;
            }
            map.insert("title_key".to_string(), Value::String(key));
            Some(Value::Object(map))
        })
        .collect()
}

/// Dispatch sanitization by collection name.
pub fn sanitize_collection(collection: &str, records: Vec<Value>) -> Vec<Value> {
    match collection {
        "shows" => sanitize_shows(records),
        "tickets" => sanitize_tickets(records),
        "advertisements" => sanitize_advertisements(records),
        "sheet_rows" => sanitize_sheet_rows(records),
        _ => sanitize_keyed(records),
    }
}

/// The canonical record key a sanitized record is stored under.
pub fn record_key(collection: &str, record: &Value) -> Option<String> {
    let map = record.as_object()?;
    let key_field = match collection {
        "tickets" | "advertisements" => "show_id",
        "sheet_rows" => "title_key",
        _ => "id",
    };
    map.get(key_field).and_then(|value| match value {
        Value::String(s) => Some(s.clone()),
        other => coerce_i64(other).map(|n| n.to_string()),
    })
}
