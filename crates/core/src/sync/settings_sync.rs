//! Pull and push of shared preferences through the remote settings table.

use log::{debug, warn};
use serde_json::{json, Value};

use crate::errors::Result;
use crate::sanitize::{coerce_string, unwrap_collection};
use crate::settings::{apply_remote_settings, AppSettings};
use crate::sync::backend::{upsert_row, RemoteBackend};
use crate::sync::status_ledger::SETTINGS_TABLE;

const SETTING_KEY_ALIASES: &[&str] = &["setting_key", "key"];
const SETTING_VALUE_ALIASES: &[&str] = &["setting_value", "value"];

/// Extract `(key, value)` pairs from raw settings-table rows, tolerating
/// both the provisioned column names and a generic key/value shape.
pub fn parse_settings_rows(payload: Value) -> Vec<(String, String)> {
    unwrap_collection(payload, "settings")
        .into_iter()
        .filter_map(|row| {
            let map = row.as_object()?;
            let key = SETTING_KEY_ALIASES
                .iter()
                .find_map(|alias| map.get(*alias))
                .and_then(coerce_string)?;
            let value = SETTING_VALUE_ALIASES
                .iter()
                .find_map(|alias| map.get(*alias))
                .and_then(coerce_string)
                .unwrap_or_default();
            Some((key, value))
        })
        .collect()
}

/// Fetch the remote settings table and apply it onto `current`. Returns the
/// merged settings only when something changed; `Ok(None)` covers both "no
/// change" and an unreadable table (remote settings are best-effort).
pub async fn pull_remote_settings(
    backend: &dyn RemoteBackend,
    current: &AppSettings,
) -> Result<Option<AppSettings>> {
    let payload = match backend.list_rows(SETTINGS_TABLE).await {
        Ok(payload) => payload,
        Err(err) => {
            debug!("[Settings] Remote settings unavailable: {}", err);
            return Ok(None);
        }
    };
    let rows = parse_settings_rows(payload);
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(apply_remote_settings(current, &rows))
}

/// Publish one setting to the remote table. Failures are logged, never
/// propagated: the local write already succeeded and the next client to
/// push will overwrite the stale row anyway.
pub async fn push_setting(backend: &dyn RemoteBackend, key: &str, value: &str, updated_at: i64) {
    let data = json!({
        "setting_key": key,
        "setting_value": value,
        "updated_at": updated_at,
    });
    if let Err(err) = upsert_row(backend, SETTINGS_TABLE, "setting_key", key, &data).await {
        warn!("[Settings] Pushing {} to remote failed: {}", key, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_provisioned_and_generic_row_shapes() {
        let rows = parse_settings_rows(json!({"data": [
            {"setting_key": "theme", "setting_value": "light"},
            {"key": "fontSize", "value": "large"},
            {"setting_key": "emptyValue"},
            {"setting_value": "orphan"}
        ]}));
        assert_eq!(
            rows,
            vec![
                ("theme".to_string(), "light".to_string()),
                ("fontSize".to_string(), "large".to_string()),
                ("emptyValue".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn bare_array_payloads_parse_too() {
        let rows = parse_settings_rows(json!([
            {"setting_key": "pollIntervalSecs", "setting_value": "120"}
        ]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "pollIntervalSecs");
    }
}
