//! Event sink used to notify UI subscribers after state mutations.
//!
//! The dashboard publishes observable state instead of throwing at callers;
//! runtime bridges (Tauri/Web) implement [`EventSink`] to forward these to
//! their frontend channels.

use serde::Serialize;

use crate::sync::connection::ConnectionStatus;
use crate::sync::SyncReport;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DashboardEvent {
    #[serde(rename_all = "camelCase")]
    ConnectionChanged {
        status: ConnectionStatus,
        message: Option<String>,
    },
    SettingsChanged,
    #[serde(rename_all = "camelCase")]
    DataSynced { report: SyncReport },
    #[serde(rename_all = "camelCase")]
    StatusesRefreshed { changed: usize },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: DashboardEvent);
}

/// Sink that drops every event. Used by headless callers and tests.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: DashboardEvent) {}
}
