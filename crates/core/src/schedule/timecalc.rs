//! Duration parsing and calendar-safe time arithmetic.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde_json::Value;

/// Parse a movie duration into minutes. Accepts a raw minute count
/// (number or numeric string), `HH:MM:SS`, or `MM:SS`.
pub fn parse_duration_minutes(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            let parts: Vec<&str> = trimmed.split(':').collect();
            match parts.as_slice() {
                [h, m, _s] => {
                    let hours = h.trim().parse::<i64>().ok()?;
                    let minutes = m.trim().parse::<i64>().ok()?;
                    hours.checked_mul(60)?.checked_add(minutes)
                }
                [m, _s] => m.trim().parse::<i64>().ok(),
                [m] => m.trim().parse::<i64>().ok(),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Parse an embedded-trailer duration from spreadsheet free text into
/// seconds. Accepts `H:MM:SS`, `MM:SS`, or a bare number of seconds
/// embedded in arbitrary text; anything else counts as zero.
pub fn parse_embedded_seconds(text: &str) -> i64 {
    let trimmed = text.trim();
    if trimmed.contains(':') {
        let parts: Vec<i64> = trimmed
            .split(':')
            .map(|p| p.trim().parse::<i64>().unwrap_or(0))
            .collect();
        return match parts.as_slice() {
            [h, m, s] => h * 3600 + m * 60 + s,
            [m, s] => m * 60 + s,
            _ => 0,
        };
    }
    let digits: String = trimmed
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().unwrap_or(0)
}

/// Add minutes to a `HH:MM` start on a given calendar date, returning the
/// resulting `HH:MM`. Rolls over hours and days through real calendar math,
/// with a plain modulo fallback when the inputs do not parse or the minute
/// count exceeds what chrono can represent. Remote payloads are the source
/// of the minute count, so absurd values must degrade, not panic.
pub fn add_minutes(date: &str, time: &str, minutes: i64) -> String {
    let parsed_date = NaiveDate::parse_from_str(date, "%Y-%m-%d");
    let parsed_time = NaiveTime::parse_from_str(time, "%H:%M");
    if let (Ok(d), Ok(t)) = (parsed_date, parsed_time) {
        let end = Duration::try_minutes(minutes)
            .and_then(|delta| d.and_time(t).checked_add_signed(delta));
        if let Some(end) = end {
            return end.format("%H:%M").to_string();
        }
    }

    let (h, m) = time
        .split_once(':')
        .and_then(|(h, m)| Some((h.parse::<i64>().ok()?, m.parse::<i64>().ok()?)))
        .unwrap_or((0, 0));
    let total = (h * 60 + m).saturating_add(minutes).rem_euclid(24 * 60);
    format!("{:02}:{:02}", total / 60, total % 60)
}
