use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::errors::{Error, Result};
use crate::events::{DashboardEvent, EventSink};
use crate::settings::SETTINGS_STORAGE_KEY;
use crate::status::ContentStatus;
use crate::sync::backend::{HealthReport, RemoteBackend, TableSpec};
use crate::sync::connection::ConnectionStatus;
use crate::sync::service::ScheduleService;
use crate::sync::status_ledger::{SETTINGS_TABLE, STATUS_TABLE};
use crate::sync::store::{
    collections, DbStats, LocalStore, StoredRecord, LAST_SYNC_META_KEY,
};

#[derive(Default)]
struct MockBackend {
    payloads: Mutex<HashMap<String, Value>>,
    failing_endpoints: Mutex<HashSet<String>>,
    health_ok: Mutex<bool>,
    tables: Mutex<HashSet<String>>,
    rows: Mutex<HashMap<String, Vec<Value>>>,
    create_calls: Mutex<Vec<String>>,
    inserts: Mutex<Vec<(String, Value)>>,
    updates: Mutex<Vec<(String, Value, String)>>,
    insert_error: Mutex<Option<u16>>,
    create_error: Mutex<Option<u16>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockBackend {
    fn new() -> Self {
        let backend = Self::default();
        *backend.health_ok.lock().unwrap() = true;
        backend
    }

    fn set_payload(&self, endpoint: &str, payload: Value) {
        self.payloads
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), payload);
    }

    fn fail_endpoint(&self, endpoint: &str) {
        self.failing_endpoints
            .lock()
            .unwrap()
            .insert(endpoint.to_string());
    }

    fn add_table(&self, table: &str) {
        self.tables.lock().unwrap().insert(table.to_string());
    }

    fn set_rows(&self, table: &str, rows: Vec<Value>) {
        self.rows.lock().unwrap().insert(table.to_string(), rows);
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    fn set_target(&self, _base_url: &str, _api_key: &str) {}

    async fn health(&self) -> Result<HealthReport> {
        if *self.health_ok.lock().unwrap() {
            Ok(HealthReport {
                status: "running".to_string(),
                version: Some("2.1.0".to_string()),
                message: None,
                timestamp: None,
            })
        } else {
            Err(Error::network("connection refused (os error 111)"))
        }
    }

    async fn fetch_collection(&self, name: &str) -> Result<Value> {
        let gate = self.fetch_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing_endpoints.lock().unwrap().contains(name) {
            return Err(Error::network(format!("endpoint {} unreachable", name)));
        }
        Ok(self
            .payloads
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| json!([])))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().contains(table))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        self.create_calls
            .lock()
            .unwrap()
            .push(spec.table_name.clone());
        if let Some(status) = *self.create_error.lock().unwrap() {
            return Err(Error::api(status, "schema rejected"));
        }
        self.tables.lock().unwrap().insert(spec.table_name.clone());
        Ok(())
    }

    async fn list_rows(&self, table: &str) -> Result<Value> {
        match self.rows.lock().unwrap().get(table) {
            Some(rows) => Ok(json!(rows)),
            None => Err(Error::api(404, "table not found")),
        }
    }

    async fn insert_row(&self, table: &str, data: &Value) -> Result<()> {
        if let Some(status) = *self.insert_error.lock().unwrap() {
            return Err(Error::api(status, "duplicate key"));
        }
        self.inserts
            .lock()
            .unwrap()
            .push((table.to_string(), data.clone()));
        Ok(())
    }

    async fn update_row(&self, table: &str, data: &Value, where_condition: &str) -> Result<()> {
        self.updates.lock().unwrap().push((
            table.to_string(),
            data.clone(),
            where_condition.to_string(),
        ));
        Ok(())
    }
}

#[derive(Default)]
struct MockStore {
    records: Mutex<HashMap<String, Vec<StoredRecord>>>,
    meta: Mutex<HashMap<String, String>>,
}

impl MockStore {
    fn seed(&self, collection: &str, records: Vec<StoredRecord>) {
        self.records
            .lock()
            .unwrap()
            .insert(collection.to_string(), records);
    }
}

fn keyed(key: &str, payload: Value) -> StoredRecord {
    StoredRecord::new(key, payload)
}

#[async_trait]
impl LocalStore for MockStore {
    async fn replace_collection(
        &self,
        collection: &str,
        records: Vec<StoredRecord>,
    ) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(collection.to_string(), records);
        Ok(())
    }

    async fn collection(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(collection)
            .map(|records| records.iter().map(|r| r.payload.clone()).collect())
            .unwrap_or_default())
    }

    async fn shows_for_date(&self, date: &str) -> Result<Vec<Value>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(collections::SHOWS)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.show_date.as_deref() == Some(date))
                    .map(|r| r.payload.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn shows_for_hall_date(&self, hall_id: i64, date: &str) -> Result<Vec<Value>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(collections::SHOWS)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| {
                        r.show_date.as_deref() == Some(date) && r.hall_id == Some(hall_id)
                    })
                    .map(|r| r.payload.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn patch_show_status(
        &self,
        show_key: &str,
        status: ContentStatus,
        updated_at: i64,
    ) -> Result<()> {
        if let Some(records) = self.records.lock().unwrap().get_mut(collections::SHOWS) {
            for record in records.iter_mut() {
                if record.key == show_key {
                    if let Some(map) = record.payload.as_object_mut() {
                        map.insert(
                            "content_status".to_string(),
                            Value::String(status.as_str().to_string()),
                        );
                        map.insert("status_updated_at".to_string(), Value::from(updated_at));
                    }
                }
            }
        }
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self.meta.lock().unwrap().get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.meta
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn stats(&self) -> Result<DbStats> {
        let counts: BTreeMap<String, i64> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(name, records)| (name.clone(), records.len() as i64))
            .collect();
        let last_sync_at = self
            .meta
            .lock()
            .unwrap()
            .get(LAST_SYNC_META_KEY)
            .and_then(|raw| raw.parse().ok());
        Ok(DbStats {
            counts,
            last_sync_at,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<DashboardEvent>>,
}

impl RecordingSink {
    fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                DashboardEvent::ConnectionChanged { .. } => "connection",
                DashboardEvent::SettingsChanged => "settings",
                DashboardEvent::DataSynced { .. } => "synced",
                DashboardEvent::StatusesRefreshed { .. } => "statuses",
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: DashboardEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Fixture {
    backend: Arc<MockBackend>,
    store: Arc<MockStore>,
    sink: Arc<RecordingSink>,
    service: Arc<ScheduleService>,
}

fn fixture() -> Fixture {
    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(MockStore::default());
    let sink = Arc::new(RecordingSink::default());
    let service = Arc::new(ScheduleService::new(
        backend.clone(),
        store.clone(),
        sink.clone(),
    ));
    Fixture {
        backend,
        store,
        sink,
        service,
    }
}

fn seed_backend_catalog(backend: &MockBackend) {
    backend.set_payload(
        "movies",
        json!([{"id": 101, "name": "Dune", "duration": 166}]),
    );
    backend.set_payload("halls", json!({"data": [{"id": 5, "name": "Hall 5"}]}));
    backend.set_payload(
        "shows",
        json!([{
            "id": 1, "movieId": 101, "hallId": 5,
            "start_time": "2024-01-01T19:00"
        }]),
    );
    backend.set_payload("tickets", json!([{"ShowID": 1, "Tickets": 17}]));
    backend.set_payload(
        "google-sheets",
        json!([{"Movie": "Dune", "dcp_name": "DUNE_FTR"}]),
    );
}

#[tokio::test]
async fn full_sync_persists_sanitized_collections_and_merges_statuses() {
    let f = fixture();
    seed_backend_catalog(&f.backend);
    f.backend.add_table(STATUS_TABLE);
    f.backend.add_table(SETTINGS_TABLE);
    f.backend.set_rows(
        STATUS_TABLE,
        vec![json!({"movies_name": "dune", "halls_5": "ready_hall", "updated_at": 42})],
    );

    f.service.initialize().await.unwrap();
    let report = f.service.sync_all_data(false).await.unwrap();

    assert!(!report.skipped);
    assert!(report.failed_collections.is_empty());
    assert_eq!(report.collection_counts["movies"], 1);
    assert_eq!(report.collection_counts["shows"], 1);
    assert_eq!(report.statuses_applied, 1);

    // Status was merged before persistence, so the stored show carries it.
    let shows = f.store.collection(collections::SHOWS).await.unwrap();
    assert_eq!(shows[0]["content_status"], json!("ready_hall"));
    assert_eq!(shows[0]["status_updated_at"], json!(42));

    let stats = f.service.get_db_stats().await.unwrap();
    assert!(stats.last_sync_at.is_some());

    let sessions = f.service.get_daily_schedule("2024-01-01").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].movie_title, "Dune");
    assert_eq!(sessions[0].content_status, ContentStatus::ReadyHall);
    assert_eq!(sessions[0].dcp_name, "DUNE_FTR");
    assert_eq!(sessions[0].ticket_count, 17);

    assert!(f.sink.kinds().contains(&"synced"));
}

#[tokio::test]
async fn provisioning_is_cached_after_first_success() {
    let f = fixture();
    f.service.initialize().await.unwrap();

    f.service.sync_all_data(true).await.unwrap();
    assert_eq!(
        *f.backend.create_calls.lock().unwrap(),
        vec![STATUS_TABLE.to_string(), SETTINGS_TABLE.to_string()]
    );

    // Even if the server forgot the tables, the cached flags skip the probe.
    f.backend.tables.lock().unwrap().clear();
    f.service.sync_all_data(true).await.unwrap();
    assert_eq!(f.backend.create_calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn schema_rejection_disables_remote_tables_but_sync_succeeds() {
    let f = fixture();
    seed_backend_catalog(&f.backend);
    *f.backend.create_error.lock().unwrap() = Some(422);
    f.service.initialize().await.unwrap();

    let report = f.service.sync_all_data(true).await.unwrap();
    assert_eq!(report.collection_counts["movies"], 1);
    // Status-table creation was rejected; the settings table is not even tried.
    assert_eq!(f.backend.create_calls.lock().unwrap().len(), 1);

    f.service.sync_all_data(true).await.unwrap();
    assert_eq!(f.backend.create_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_endpoint_degrades_to_empty_collection() {
    let f = fixture();
    seed_backend_catalog(&f.backend);
    f.backend.add_table(STATUS_TABLE);
    f.backend.add_table(SETTINGS_TABLE);
    f.service.initialize().await.unwrap();
    f.service.sync_all_data(true).await.unwrap();
    assert_eq!(
        f.store.collection(collections::TICKETS).await.unwrap().len(),
        1
    );

    f.backend.fail_endpoint("tickets");
    let report = f.service.sync_all_data(false).await.unwrap();

    assert_eq!(report.failed_collections, vec!["tickets".to_string()]);
    assert_eq!(report.collection_counts["tickets"], 0);
    // The sync completed and only the failed collection was emptied.
    assert!(f
        .store
        .collection(collections::TICKETS)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(f.store.collection(collections::SHOWS).await.unwrap().len(), 1);
    let info = f.service.connection_info().await;
    assert!(info.is_connected());
}

#[tokio::test]
async fn unreachable_server_aborts_sync_with_error_state() {
    let f = fixture();
    *f.backend.health_ok.lock().unwrap() = false;
    f.service.initialize().await.unwrap();

    let err = f.service.sync_all_data(false).await.unwrap_err();
    assert!(err.to_string().contains("refused"));
    let info = f.service.connection_info().await;
    assert_eq!(info.status, ConnectionStatus::Error);
    assert!(f.sink.kinds().contains(&"connection"));
}

#[tokio::test]
async fn silent_operations_leave_published_connection_untouched() {
    let f = fixture();
    f.service.initialize().await.unwrap();

    // Healthy silent probe: the result comes back, the snapshot stays Idle.
    let info = f.service.check_connection(false).await;
    assert!(info.is_connected());
    assert_eq!(
        f.service.connection_info().await.status,
        ConnectionStatus::Idle
    );
    assert!(f.sink.kinds().is_empty());

    // Failed silent sync: the error is returned, not published.
    *f.backend.health_ok.lock().unwrap() = false;
    f.service.sync_all_data(true).await.unwrap_err();
    assert_eq!(
        f.service.connection_info().await.status,
        ConnectionStatus::Idle
    );
    assert!(f.sink.kinds().is_empty());
}

#[tokio::test]
async fn concurrent_sync_is_skipped() {
    let f = fixture();
    f.service.initialize().await.unwrap();

    let gate = Arc::new(Notify::new());
    *f.backend.fetch_gate.lock().unwrap() = Some(gate.clone());

    let service = f.service.clone();
    let running = tokio::spawn(async move { service.sync_all_data(true).await });
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let second = f.service.sync_all_data(true).await.unwrap();
    assert!(second.skipped);

    gate.notify_one();
    let first = running.await.unwrap().unwrap();
    assert!(!first.skipped);
}

#[tokio::test]
async fn statuses_only_poll_patches_local_shows() {
    let f = fixture();
    f.store.seed(
        collections::MOVIES,
        vec![keyed("101", json!({"id": 101, "name": "Dune"}))],
    );
    f.store.seed(
        collections::SHOWS,
        vec![keyed("1", json!({"id": 1, "movie_id": 101, "hall_id": 5}))],
    );
    f.backend.set_rows(
        STATUS_TABLE,
        vec![json!({"movies_name": "dune", "status_global": "on_storage", "updated_at": 9})],
    );
    f.service.initialize().await.unwrap();

    let changed = f.service.sync_statuses_only(false).await.unwrap();
    assert_eq!(changed, 1);
    let shows = f.store.collection(collections::SHOWS).await.unwrap();
    assert_eq!(shows[0]["content_status"], json!("on_storage"));
    assert_eq!(f.sink.kinds(), vec!["statuses"]);

    // Second poll with identical ledger: nothing to patch, no event.
    let changed = f.service.sync_statuses_only(false).await.unwrap();
    assert_eq!(changed, 0);
    assert_eq!(f.sink.kinds(), vec!["statuses"]);
}

#[tokio::test]
async fn hall_specific_status_lands_in_hall_column() {
    let f = fixture();
    f.store.seed(
        collections::MOVIES,
        vec![keyed("101", json!({"id": 101, "name": "Dune"}))],
    );
    f.store.seed(
        collections::HALLS,
        vec![keyed("5", json!({"id": 5, "name": "Hall 5"}))],
    );
    f.store.seed(
        collections::SHOWS,
        vec![keyed("1", json!({"id": 1, "movie_id": 101, "hall_id": 5}))],
    );
    f.backend.add_table(STATUS_TABLE);
    f.service.initialize().await.unwrap();

    f.service
        .set_session_status("1", ContentStatus::ReadyHall)
        .await
        .unwrap();

    let inserts = f.backend.inserts.lock().unwrap();
    assert_eq!(inserts.len(), 1);
    let (table, data) = &inserts[0];
    assert_eq!(table, STATUS_TABLE);
    assert_eq!(data["movies_name"], json!("dune"));
    assert_eq!(data["halls_5"], json!("ready_hall"));
    assert!(data.get("status_global").is_none());
    drop(inserts);

    // The local show is patched immediately.
    let shows = f.store.collection(collections::SHOWS).await.unwrap();
    assert_eq!(shows[0]["content_status"], json!("ready_hall"));
    assert_eq!(f.sink.kinds(), vec!["statuses"]);
}

#[tokio::test]
async fn global_status_falls_back_to_update_on_insert_conflict() {
    let f = fixture();
    f.store.seed(
        collections::MOVIES,
        vec![keyed("101", json!({"id": 101, "name": "Dune"}))],
    );
    f.store.seed(
        collections::SHOWS,
        vec![keyed("1", json!({"id": 1, "movie_id": 101, "hall_id": 5}))],
    );
    f.backend.add_table(STATUS_TABLE);
    *f.backend.insert_error.lock().unwrap() = Some(409);
    f.service.initialize().await.unwrap();

    f.service
        .set_session_status("1", ContentStatus::NoKeys)
        .await
        .unwrap();

    let updates = f.backend.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    let (table, data, condition) = &updates[0];
    assert_eq!(table, STATUS_TABLE);
    // `no_keys` is not hall-specific, so it goes to the global column.
    assert_eq!(data["status_global"], json!("no_keys"));
    assert_eq!(condition, "movies_name = 'dune'");
}

#[tokio::test]
async fn unknown_session_is_rejected() {
    let f = fixture();
    f.service.initialize().await.unwrap();
    let err = f
        .service
        .set_session_status("999", ContentStatus::ReadyHall)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown session"));
}

#[tokio::test]
async fn check_connection_reports_version_then_failure() {
    let f = fixture();
    f.service.initialize().await.unwrap();

    let info = f.service.check_connection(true).await;
    assert!(info.is_connected());
    assert_eq!(info.server_version.as_deref(), Some("2.1.0"));
    assert_eq!(f.sink.kinds(), vec!["connection", "connection"]);

    *f.backend.health_ok.lock().unwrap() = false;
    let info = f.service.check_connection(false).await;
    assert_eq!(info.status, ConnectionStatus::Error);
    assert!(info.last_error.as_deref().unwrap_or("").contains("refused"));
    // Silent probe adds no events.
    assert_eq!(f.sink.kinds(), vec!["connection", "connection"]);
}

#[tokio::test]
async fn configure_reprobes_and_provisions_but_never_syncs_data() {
    let f = fixture();
    f.service.initialize().await.unwrap();

    let updated = f
        .service
        .configure("http://projector-room:9000", "secret")
        .await
        .unwrap();
    assert_eq!(updated.server_url, "http://projector-room:9000");

    let raw = f
        .store
        .get_meta(SETTINGS_STORAGE_KEY)
        .await
        .unwrap()
        .expect("persisted settings");
    assert!(raw.contains("projector-room"));

    // Settings persisted, connection re-probed, tables provisioned.
    assert_eq!(f.sink.kinds(), vec!["settings", "connection", "connection"]);
    assert_eq!(f.backend.create_calls.lock().unwrap().len(), 2);
    // Heavy session data is untouched: nothing was fetched or persisted.
    assert!(f.store.collection(collections::SHOWS).await.unwrap().is_empty());

    let err = f.service.configure("http://host:99999", "k").await.unwrap_err();
    assert!(err.to_string().contains("port"));
}

#[tokio::test]
async fn save_setting_pushes_shared_keys_but_not_connection_params() {
    let f = fixture();
    f.backend.add_table(SETTINGS_TABLE);
    f.service.initialize().await.unwrap();

    let updated = f.service.save_setting("fontSize", "large").await.unwrap();
    assert_eq!(updated.font_size, "large");
    let inserts = f.backend.inserts.lock().unwrap();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].1["setting_key"], json!("fontSize"));
    drop(inserts);

    f.service
        .save_setting("apiKey", "rotated")
        .await
        .unwrap();
    // Connection parameters are local-authoritative and never pushed.
    assert_eq!(f.backend.inserts.lock().unwrap().len(), 1);

    let err = f.service.save_setting("nope", "x").await.unwrap_err();
    assert!(err.to_string().contains("Unknown setting"));
}

#[tokio::test]
async fn remote_settings_pull_applies_during_sync() {
    let f = fixture();
    f.backend.add_table(STATUS_TABLE);
    f.backend.add_table(SETTINGS_TABLE);
    f.backend.set_rows(
        SETTINGS_TABLE,
        vec![
            json!({"setting_key": "theme", "setting_value": "light"}),
            json!({"setting_key": "serverUrl", "setting_value": "http://evil:1"}),
        ],
    );
    f.service.initialize().await.unwrap();

    f.service.sync_all_data(true).await.unwrap();
    let settings = f.service.settings().await;
    assert_eq!(settings.theme, "light");
    // The local-authoritative key was ignored.
    assert_eq!(settings.server_url, "http://127.0.0.1:8000");
    assert!(f.sink.kinds().contains(&"settings"));
}
