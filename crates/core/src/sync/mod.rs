//! Aggregation and synchronization engine.

pub mod backend;
pub mod connection;
pub mod provision;
pub mod service;
pub mod settings_sync;
pub mod status_ledger;
pub mod store;

pub use backend::{upsert_row, HealthReport, RemoteBackend, TableColumn, TableSpec};
pub use connection::{ConnectionInfo, ConnectionStatus};
pub use provision::ProvisionState;
pub use service::{ScheduleService, SyncReport};
pub use status_ledger::{RemoteStatusRecord, StatusPatch, SETTINGS_TABLE, STATUS_TABLE};
pub use store::{collections, DbStats, LocalStore, StoredRecord, LAST_SYNC_META_KEY};

#[cfg(test)]
mod tests;
