//! Joins shows with the other local collections into [`MovieSession`]s.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::sanitize::{coerce_i64, coerce_string, first_alias};
use crate::status::ContentStatus;
use crate::titles::normalize_movie_title;

use super::model::MovieSession;
use super::timecalc::{add_minutes, parse_duration_minutes, parse_embedded_seconds};

/// Shown when neither the spreadsheet nor the movie record carries a value.
const PLACEHOLDER: &str = "—";

const MOVIE_TITLE: &[&str] = &["name", "title", "original_name"];
const MOVIE_AGE: &[&str] = &["age_limit", "ageLimit", "age"];
const MOVIE_POSTER: &[&str] = &["poster", "poster_url", "posterUrl"];
const SHEET_DCP: &[&str] = &["dcp_name", "dcp", "DCP", "package"];
const MOVIE_DCP: &[&str] = &["dcp_name", "dcp"];
const SHEET_DISTRIBUTOR: &[&str] = &["distributor", "Distributor", "studio"];
const MOVIE_DISTRIBUTOR: &[&str] = &["distributor", "studio"];
const SHEET_CREDITS: &[&str] = &["credits_offset", "credits", "credits_start"];
const SHEET_CREDITS_END: &[&str] = &["credits_end_offset", "credits_end"];
const SHEET_TRAILERS: &[&str] = &["embedded_ads", "trailers", "trailer_duration"];
const NAME_FIELD: &[&str] = &["name", "title"];

/// Borrowed view over the local collections a projection joins against.
pub struct ScheduleJoin<'a> {
    pub movies: &'a [Value],
    pub halls: &'a [Value],
    pub formats: &'a [Value],
    pub tickets: &'a [Value],
    pub advertisements: &'a [Value],
    pub sheet_rows: &'a [Value],
}

fn index_by_id<'a>(records: &'a [Value]) -> HashMap<i64, &'a Map<String, Value>> {
    records
        .iter()
        .filter_map(|record| {
            let map = record.as_object()?;
            let id = map.get("id").and_then(coerce_i64)?;
            Some((id, map))
        })
        .collect()
}

fn index_by_show<'a>(records: &'a [Value]) -> HashMap<i64, &'a Map<String, Value>> {
    records
        .iter()
        .filter_map(|record| {
            let map = record.as_object()?;
            let show_id = map.get("show_id").and_then(coerce_i64)?;
            Some((show_id, map))
        })
        .collect()
}

fn index_by_title_key<'a>(records: &'a [Value]) -> HashMap<&'a str, &'a Map<String, Value>> {
    records
        .iter()
        .filter_map(|record| {
            let map = record.as_object()?;
            let key = map.get("title_key").and_then(Value::as_str)?;
            Some((key, map))
        })
        .collect()
}

/// Movie duration in minutes, with the first release as fallback source.
fn movie_duration(movie: Option<&Map<String, Value>>) -> i64 {
    let Some(movie) = movie else { return 0 };
    if let Some(minutes) = movie.get("duration").and_then(|v| parse_duration_minutes(v)) {
        return minutes;
    }
    movie
        .get("releases")
        .and_then(Value::as_array)
        .and_then(|releases| releases.first())
        .and_then(Value::as_object)
        .and_then(|release| release.get("duration"))
        .and_then(|v| parse_duration_minutes(v))
        .unwrap_or(0)
}

fn string_field(
    sheet: Option<&Map<String, Value>>,
    movie: Option<&Map<String, Value>>,
    sheet_aliases: &[&str],
    movie_aliases: &[&str],
) -> String {
    sheet
        .and_then(|row| first_alias(row, sheet_aliases))
        .and_then(coerce_string)
        .or_else(|| {
            movie
                .and_then(|m| first_alias(m, movie_aliases))
                .and_then(coerce_string)
        })
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Build presentation-ready sessions from sanitized shows plus the joined
/// local collections, sorted by start time (`HH:MM` is fixed-width, so the
/// lexicographic order is the chronological one).
pub fn project_sessions(shows: &[Value], join: &ScheduleJoin<'_>) -> Vec<MovieSession> {
    let movies = index_by_id(join.movies);
    let halls = index_by_id(join.halls);
    let formats = index_by_id(join.formats);
    let tickets = index_by_show(join.tickets);
    let ads = index_by_show(join.advertisements);
    let sheet = index_by_title_key(join.sheet_rows);

    let mut sessions: Vec<MovieSession> = shows
        .iter()
        .filter_map(|show| {
            let map = show.as_object()?;
            let id = map.get("id").and_then(coerce_i64)?;

            let movie = map
                .get("movie_id")
                .and_then(coerce_i64)
                .and_then(|movie_id| movies.get(&movie_id).copied());
            let movie_title = movie
                .and_then(|m| first_alias(m, MOVIE_TITLE))
                .and_then(coerce_string)
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            let title_key = normalize_movie_title(&movie_title);
            let sheet_row = sheet.get(title_key.as_str()).copied();

            let hall = map
                .get("hall_id")
                .and_then(coerce_i64)
                .and_then(|hall_id| halls.get(&hall_id).copied());
            let hall_name = hall
                .and_then(|h| first_alias(h, NAME_FIELD))
                .and_then(coerce_string)
                .unwrap_or_else(|| PLACEHOLDER.to_string());

            let format = map
                .get("format_id")
                .and_then(coerce_i64)
                .and_then(|format_id| formats.get(&format_id).copied())
                .and_then(|f| first_alias(f, NAME_FIELD))
                .and_then(coerce_string)
                .unwrap_or_else(|| PLACEHOLDER.to_string());

            let ticket_count = tickets
                .get(&id)
                .and_then(|t| t.get("occupied_count"))
                .and_then(coerce_i64)
                .unwrap_or(0);

            let commercial_seconds = ads
                .get(&id)
                .and_then(|a| a.get("total_seconds"))
                .and_then(coerce_i64)
                .unwrap_or(0);
            let trailer_seconds = sheet_row
                .and_then(|row| first_alias(row, SHEET_TRAILERS))
                .and_then(coerce_string)
                .map(|text| parse_embedded_seconds(&text))
                .unwrap_or(0);
            let ad_seconds = commercial_seconds.saturating_add(trailer_seconds);

            let duration_minutes = movie_duration(movie);
            let date = map
                .get("date")
                .and_then(coerce_string)
                .unwrap_or_default();
            let time = map
                .get("time")
                .and_then(coerce_string)
                .unwrap_or_else(|| "00:00".to_string());
            let end_time = add_minutes(&date, &time, duration_minutes.saturating_add(ad_seconds / 60));

            let content_status = map
                .get("content_status")
                .and_then(Value::as_str)
                .and_then(ContentStatus::parse)
                .unwrap_or_default();
            let status_updated_at = map
                .get("status_updated_at")
                .and_then(coerce_i64)
                .unwrap_or(0);

            Some(MovieSession {
                id: id.to_string(),
                hall_name,
                date,
                time,
                end_time,
                duration_minutes,
                ad_seconds,
                age_limit: movie
                    .and_then(|m| first_alias(m, MOVIE_AGE))
                    .and_then(coerce_string),
                movie_title,
                dcp_name: string_field(sheet_row, movie, SHEET_DCP, MOVIE_DCP),
                format,
                ticket_count,
                poster: movie
                    .and_then(|m| first_alias(m, MOVIE_POSTER))
                    .and_then(coerce_string),
                content_status,
                status_updated_at,
                distributor: string_field(sheet_row, movie, SHEET_DISTRIBUTOR, MOVIE_DISTRIBUTOR),
                credits_offset: sheet_row
                    .and_then(|row| first_alias(row, SHEET_CREDITS))
                    .and_then(coerce_string),
                credits_end_offset: sheet_row
                    .and_then(|row| first_alias(row, SHEET_CREDITS_END))
                    .and_then(coerce_string),
            })
        })
        .collect();

    sessions.sort_by(|a, b| a.time.cmp(&b.time));
    sessions
}
