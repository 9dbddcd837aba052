//! Remote backend contract and shared request shapes.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;

/// Response contract of the health probe (`GET /`). The probe succeeds only
/// when `status` is the literal `"running"`; any other shape is a connection
/// failure, not a crash.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl HealthReport {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub is_required: bool,
    pub is_primary_key: bool,
}

impl TableColumn {
    pub fn primary_key(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_required: true,
            is_primary_key: true,
        }
    }

    pub fn nullable(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_required: false,
            is_primary_key: false,
        }
    }
}

/// Create-table request body (`POST /api/database/tables`).
#[derive(Debug, Clone, Serialize)]
pub struct TableSpec {
    pub table_name: String,
    pub display_name: String,
    pub description: String,
    pub columns: Vec<TableColumn>,
    pub is_protected: bool,
}

/// Transport seam to the cinema management server. Implemented over HTTP by
/// `kinodesk-backend-client`; tests substitute in-memory mocks.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Point the client at a server. Resets nothing else; provisioning
    /// flags are the service's concern.
    fn set_target(&self, base_url: &str, api_key: &str);

    /// `GET /` with the health-probe retry budget.
    async fn health(&self) -> Result<HealthReport>;

    /// `GET /cinema/{name}`: raw collection payload, any envelope shape.
    async fn fetch_collection(&self, name: &str) -> Result<Value>;

    /// `GET /api/database/tables/{table}`: a 404 means "absent", not an error.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// `POST /api/database/tables`.
    async fn create_table(&self, spec: &TableSpec) -> Result<()>;

    /// `GET /api/database/tables/{table}/data`: rows, any envelope shape.
    async fn list_rows(&self, table: &str) -> Result<Value>;

    /// `POST /api/database/data/insert`.
    async fn insert_row(&self, table: &str, data: &Value) -> Result<()>;

    /// `PUT /api/database/data/update` with a raw `<col> = '<value>'`
    /// condition, per the remote API contract.
    async fn update_row(&self, table: &str, data: &Value, where_condition: &str) -> Result<()>;
}

/// Escape a value for the update endpoint's raw SQL-fragment condition.
/// Movie titles can contain quotes; doubling them is the one remediation
/// the remote contract allows.
pub fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Two-phase upsert against the remote table API: INSERT first, and on any
/// rejection (typically a primary-key conflict) retry as an UPDATE keyed by
/// `key_column`. The remote API has no native upsert.
pub async fn upsert_row(
    backend: &dyn RemoteBackend,
    table: &str,
    key_column: &str,
    key_value: &str,
    data: &Value,
) -> Result<()> {
    match backend.insert_row(table, data).await {
        Ok(()) => Ok(()),
        Err(insert_err) => {
            debug!(
                "[Sync] Insert into {} rejected ({}), retrying as update",
                table, insert_err
            );
            let condition = format!("{} = '{}'", key_column, escape_sql_literal(key_value));
            backend.update_row(table, data, &condition).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_contract_requires_running() {
        let report: HealthReport =
            serde_json::from_str(r#"{"status":"running","version":"1.4.2"}"#).unwrap();
        assert!(report.is_running());
        assert_eq!(report.version.as_deref(), Some("1.4.2"));

        let report: HealthReport = serde_json::from_str(r#"{"status":"booting"}"#).unwrap();
        assert!(!report.is_running());
    }

    #[test]
    fn sql_literal_escaping_doubles_quotes() {
        assert_eq!(escape_sql_literal("dune"), "dune");
        assert_eq!(escape_sql_literal("don't look up"), "don''t look up");
    }
}
