//! Idempotent provisioning of the two application tables on the backend.

use log::{debug, warn};
use serde_json::Value;

use crate::sanitize::coerce_i64;
use crate::sync::backend::{RemoteBackend, TableColumn, TableSpec};
use crate::sync::status_ledger::{
    hall_column, GLOBAL_STATUS_COLUMN, SETTINGS_TABLE, STATUS_KEY_COLUMN, STATUS_TABLE,
    UPDATED_AT_COLUMN,
};

/// Per-process provisioning flags. Success is cached for the process
/// lifetime and reset on reconfiguration; a schema rejection (422/403/405)
/// marks the whole remote DB unusable until then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionState {
    pub status_table_ready: bool,
    pub settings_table_ready: bool,
    pub remote_db_available: bool,
}

impl Default for ProvisionState {
    fn default() -> Self {
        Self {
            status_table_ready: false,
            settings_table_ready: false,
            remote_db_available: true,
        }
    }
}

enum ProvisionOutcome {
    Ready,
    NotReady,
    SchemaRejected,
}

/// Schema of the content-status table: fixed key + global column +
/// timestamp + one nullable text column per currently-known hall.
pub fn status_table_spec(halls: &[Value]) -> TableSpec {
    let mut columns = vec![
        TableColumn::primary_key(STATUS_KEY_COLUMN, "text"),
        TableColumn::nullable(GLOBAL_STATUS_COLUMN, "text"),
        TableColumn::nullable(UPDATED_AT_COLUMN, "integer"),
    ];
    for hall in halls {
        if let Some(id) = hall
            .as_object()
            .and_then(|h| h.get("id"))
            .and_then(coerce_i64)
        {
            columns.push(TableColumn::nullable(hall_column(id), "text"));
        }
    }
    TableSpec {
        table_name: STATUS_TABLE.to_string(),
        display_name: "Content statuses".to_string(),
        description: "DCP readiness per movie and hall".to_string(),
        columns,
        is_protected: false,
    }
}

pub fn settings_table_spec() -> TableSpec {
    TableSpec {
        table_name: SETTINGS_TABLE.to_string(),
        display_name: "App settings".to_string(),
        description: "Shared dashboard preferences".to_string(),
        columns: vec![
            TableColumn::primary_key("setting_key", "text"),
            TableColumn::nullable("setting_value", "text"),
            TableColumn::nullable(UPDATED_AT_COLUMN, "integer"),
        ],
        is_protected: false,
    }
}

/// Probe-then-create for one table. Never propagates: failures are logged
/// and reported through the outcome so the caller can update its flags.
async fn ensure_table(backend: &dyn RemoteBackend, spec: TableSpec) -> ProvisionOutcome {
    match backend.table_exists(&spec.table_name).await {
        Ok(true) => {
            debug!("[Provision] Table {} already exists", spec.table_name);
            return ProvisionOutcome::Ready;
        }
        Ok(false) => {}
        Err(err) => {
            warn!(
                "[Provision] Existence probe for {} failed: {}",
                spec.table_name, err
            );
            return ProvisionOutcome::NotReady;
        }
    }

    match backend.create_table(&spec).await {
        Ok(()) => {
            debug!("[Provision] Created table {}", spec.table_name);
            ProvisionOutcome::Ready
        }
        Err(err) if err.is_schema_rejection() => {
            warn!(
                "[Provision] Server rejected schema for {} ({}); remote DB disabled until reconfiguration",
                spec.table_name, err
            );
            ProvisionOutcome::SchemaRejected
        }
        Err(err) => {
            warn!("[Provision] Creating {} failed: {}", spec.table_name, err);
            ProvisionOutcome::NotReady
        }
    }
}

pub async fn ensure_status_table(
    backend: &dyn RemoteBackend,
    halls: &[Value],
    state: &mut ProvisionState,
) {
    if !state.remote_db_available || state.status_table_ready {
        return;
    }
    match ensure_table(backend, status_table_spec(halls)).await {
        ProvisionOutcome::Ready => state.status_table_ready = true,
        ProvisionOutcome::SchemaRejected => state.remote_db_available = false,
        ProvisionOutcome::NotReady => {}
    }
}

pub async fn ensure_settings_table(backend: &dyn RemoteBackend, state: &mut ProvisionState) {
    if !state.remote_db_available || state.settings_table_ready {
        return;
    }
    match ensure_table(backend, settings_table_spec()).await {
        ProvisionOutcome::Ready => state.settings_table_ready = true,
        ProvisionOutcome::SchemaRejected => state.remote_db_available = false,
        ProvisionOutcome::NotReady => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_schema_has_one_column_per_hall() {
        let halls = vec![json!({"id": 5, "name": "Hall 5"}), json!({"id": 7})];
        let spec = status_table_spec(&halls);
        let names: Vec<&str> = spec.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "movies_name",
                "status_global",
                "updated_at",
                "halls_5",
                "halls_7"
            ]
        );
        assert!(spec.columns[0].is_primary_key);
        assert!(!spec.columns[3].is_required);
    }

    #[test]
    fn settings_schema_is_key_value_timestamp() {
        let spec = settings_table_spec();
        let names: Vec<&str> = spec.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["setting_key", "setting_value", "updated_at"]);
    }
}
