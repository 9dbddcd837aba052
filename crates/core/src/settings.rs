//! User preferences: local persistence model and remote-row application.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Versioned key the serialized settings object is stored under in the
/// local durable store. Bump the suffix when the shape changes.
pub const SETTINGS_STORAGE_KEY: &str = "kinodesk_settings_v2";

/// Keys a remote settings pull must never overwrite: connection parameters
/// are local-authoritative, otherwise a stale remote row could point the
/// client away from the server the user just configured.
pub const LOCAL_AUTHORITATIVE_KEYS: [&str; 2] = ["serverUrl", "apiKey"];

/// Flat application settings. Serialized with camelCase keys; the same keys
/// are used as `setting_key` values in the remote settings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub server_url: String,
    pub api_key: String,
    pub theme: String,
    pub font_size: String,
    pub poll_interval_secs: u64,
    pub show_ended_sessions: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            api_key: String::new(),
            theme: "dark".to_string(),
            font_size: "medium".to_string(),
            poll_interval_secs: 60,
            show_ended_sessions: true,
        }
    }
}

/// Parse a remote `setting_value` string: booleans first, then numbers,
/// otherwise the raw string.
pub fn parse_setting_value(raw: &str) -> Value {
    match raw.trim() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        trimmed => {
            if let Ok(n) = trimmed.parse::<i64>() {
                return Value::from(n);
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                if let Some(number) = serde_json::Number::from_f64(f) {
                    return Value::Number(number);
                }
            }
            Value::String(trimmed.to_string())
        }
    }
}

/// Apply remote settings rows onto a settings object. Returns the updated
/// object only when at least one value actually changed, so that callers
/// can skip redundant persistence and notification. Connection parameters
/// and unknown keys are ignored.
pub fn apply_remote_settings(
    current: &AppSettings,
    rows: &[(String, String)],
) -> Option<AppSettings> {
    let mut map = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        _ => return None,
    };

    let mut changed = false;
    for (key, raw_value) in rows {
        if LOCAL_AUTHORITATIVE_KEYS.contains(&key.as_str()) {
            continue;
        }
        let Some(existing) = map.get(key) else {
            continue;
        };
        let parsed = parse_setting_value(raw_value);
        if existing != &parsed {
            map.insert(key.clone(), parsed);
            changed = true;
        }
    }

    if !changed {
        return None;
    }
    serde_json::from_value(Value::Object(map)).ok()
}
