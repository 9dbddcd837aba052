//! The aggregation service: owns settings, connection state and the sync
//! pipeline, and is the only writer of the local store.
//!
//! Network and provisioning failures are converted into observable state
//! (connection snapshot + events) at the operation boundary; callers treat
//! the returned errors as already-reported.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::errors::{Error, Result};
use crate::events::{DashboardEvent, EventSink};
use crate::sanitize::{coerce_i64, record_key, sanitize_collection, unwrap_collection};
use crate::schedule::{project_sessions, MovieSession, ScheduleJoin};
use crate::settings::{AppSettings, LOCAL_AUTHORITATIVE_KEYS, SETTINGS_STORAGE_KEY};
use crate::status::ContentStatus;
use crate::sync::backend::{upsert_row, RemoteBackend};
use crate::sync::connection::{
    describe_connection_error, validate_server_url, ConnectionInfo, ConnectionStatus,
};
use crate::sync::provision::{ensure_settings_table, ensure_status_table, ProvisionState};
use crate::sync::settings_sync::{pull_remote_settings, push_setting};
use crate::sync::status_ledger::{
    apply_statuses, hall_column, parse_status_rows, GLOBAL_STATUS_COLUMN, STATUS_KEY_COLUMN,
    STATUS_TABLE, UPDATED_AT_COLUMN,
};
use crate::sync::store::{collections, LocalStore, StoredRecord, LAST_SYNC_META_KEY};
use crate::sync::DbStats;
use crate::titles::normalize_movie_title;

/// Outcome summary of one full sync, also carried by the `DataSynced` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Records persisted per collection.
    pub collection_counts: BTreeMap<String, i64>,
    /// Collections whose endpoint failed; they were persisted as empty.
    pub failed_collections: Vec<String>,
    /// Shows whose content status changed during the merge.
    pub statuses_applied: usize,
    pub duration_ms: u64,
    /// True when another sync was already running and this call did nothing.
    pub skipped: bool,
}

#[derive(Default)]
struct ServiceState {
    settings: AppSettings,
    connection: ConnectionInfo,
    provision: ProvisionState,
}

/// Resets the in-flight flag on every exit path of a sync.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ScheduleService {
    backend: Arc<dyn RemoteBackend>,
    store: Arc<dyn LocalStore>,
    events: Arc<dyn EventSink>,
    state: Mutex<ServiceState>,
    sync_in_flight: AtomicBool,
}

impl ScheduleService {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        store: Arc<dyn LocalStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            backend,
            store,
            events,
            state: Mutex::new(ServiceState::default()),
            sync_in_flight: AtomicBool::new(false),
        }
    }

    /// Load persisted settings and point the backend client at the stored
    /// server. Call once at startup, before any other operation.
    pub async fn initialize(&self) -> Result<AppSettings> {
        let settings = match self.store.get_meta(SETTINGS_STORAGE_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(
                    "[Service] Stored settings unreadable ({}), using defaults",
                    err
                );
                AppSettings::default()
            }),
            None => AppSettings::default(),
        };
        self.backend
            .set_target(&settings.server_url, &settings.api_key);
        let mut state = self.state.lock().await;
        state.settings = settings.clone();
        Ok(settings)
    }

    pub async fn settings(&self) -> AppSettings {
        self.state.lock().await.settings.clone()
    }

    pub async fn connection_info(&self) -> ConnectionInfo {
        self.state.lock().await.connection.clone()
    }

    /// Reconfigure the server connection: persist, re-target the client,
    /// reset provisioning, then re-probe. A reachable server gets its tables
    /// provisioned and the shared settings pulled, but heavy session data is
    /// never fetched here; that stays an explicit `sync_all_data` call.
    pub async fn configure(&self, server_url: &str, api_key: &str) -> Result<AppSettings> {
        validate_server_url(server_url).map_err(Error::validation)?;

        let mut updated = {
            let mut state = self.state.lock().await;
            state.settings.server_url = server_url.trim().to_string();
            state.settings.api_key = api_key.to_string();
            state.provision = ProvisionState::default();
            state.connection = ConnectionInfo::default();
            state.settings.clone()
        };
        self.persist_settings(&updated).await?;
        self.backend
            .set_target(&updated.server_url, &updated.api_key);
        self.events.emit(DashboardEvent::SettingsChanged);

        let info = self.check_connection(true).await;
        if info.is_connected() {
            let halls = self.store.collection(collections::HALLS).await?;
            self.provision_tables(&halls).await;
            if let Some(merged) = pull_remote_settings(self.backend.as_ref(), &updated).await? {
                self.persist_settings(&merged).await?;
                self.state.lock().await.settings = merged.clone();
                self.events.emit(DashboardEvent::SettingsChanged);
                updated = merged;
            }
        }
        Ok(updated)
    }

    /// Probe the server and publish the resulting connection snapshot.
    /// A failed probe is a state, not an error. A silent probe returns its
    /// result without touching the published snapshot at all, so concurrent
    /// readers never see it flicker through `Pending`.
    pub async fn check_connection(&self, emit_events: bool) -> ConnectionInfo {
        let settings = self.settings().await;
        if let Err(message) = validate_server_url(&settings.server_url) {
            let info = ConnectionInfo::error(message);
            return self.publish_connection(info, emit_events).await;
        }

        if emit_events {
            {
                let mut state = self.state.lock().await;
                state.connection.status = ConnectionStatus::Pending;
            }
            self.events.emit(DashboardEvent::ConnectionChanged {
                status: ConnectionStatus::Pending,
                message: None,
            });
        }

        let info = match self.backend.health().await {
            Ok(report) if report.is_running() => ConnectionInfo {
                status: ConnectionStatus::Connected,
                server_version: report.version,
                last_checked_at: Some(Utc::now().timestamp_millis()),
                last_error: None,
            },
            Ok(report) => ConnectionInfo {
                last_checked_at: Some(Utc::now().timestamp_millis()),
                ..ConnectionInfo::error(format!("Server is not ready (status: {})", report.status))
            },
            Err(err) => ConnectionInfo {
                last_checked_at: Some(Utc::now().timestamp_millis()),
                ..ConnectionInfo::error(describe_connection_error(&err))
            },
        };
        self.publish_connection(info, emit_events).await
    }

    /// Store and broadcast a connection snapshot. When `publish` is false
    /// the info is only returned to the caller; published state stays as-is.
    async fn publish_connection(&self, info: ConnectionInfo, publish: bool) -> ConnectionInfo {
        if publish {
            {
                let mut state = self.state.lock().await;
                state.connection = info.clone();
            }
            self.events.emit(DashboardEvent::ConnectionChanged {
                status: info.status,
                message: info.last_error.clone(),
            });
        }
        info
    }

    async fn provision_tables(&self, halls: &[Value]) {
        let mut provision = self.state.lock().await.provision.clone();
        ensure_status_table(self.backend.as_ref(), halls, &mut provision).await;
        ensure_settings_table(self.backend.as_ref(), &mut provision).await;
        self.state.lock().await.provision = provision;
    }

    /// The primary ETL entrypoint. At most one sync runs at a time; a call
    /// that finds another in flight returns immediately with `skipped`.
    pub async fn sync_all_data(&self, silent: bool) -> Result<SyncReport> {
        if self
            .sync_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[Service] Sync already in flight, skipping");
            return Ok(SyncReport {
                skipped: true,
                ..SyncReport::default()
            });
        }
        let _guard = InFlightGuard(&self.sync_in_flight);

        match self.run_full_sync().await {
            Ok((info, report)) => {
                if !silent {
                    self.publish_connection(info, true).await;
                    self.events.emit(DashboardEvent::DataSynced {
                        report: report.clone(),
                    });
                }
                Ok(report)
            }
            Err(err) => {
                if !silent {
                    let info = ConnectionInfo {
                        last_checked_at: Some(Utc::now().timestamp_millis()),
                        ..ConnectionInfo::error(err.to_string())
                    };
                    self.publish_connection(info, true).await;
                }
                Err(err)
            }
        }
    }

    /// Fetch and sanitize every collection concurrently, pull shared
    /// settings, merge the remote status ledger into shows before
    /// persistence, and replace the local collections wholesale. A failed
    /// endpoint degrades to an empty collection instead of failing the sync.
    async fn run_full_sync(&self) -> Result<(ConnectionInfo, SyncReport)> {
        let started = Instant::now();
        let settings = self.settings().await;
        validate_server_url(&settings.server_url).map_err(Error::validation)?;

        // Silent probe: the caller decides whether the result is published.
        let info = self.check_connection(false).await;
        if !info.is_connected() {
            return Err(Error::network(
                info.last_error
                    .unwrap_or_else(|| "Server unreachable".to_string()),
            ));
        }

        if let Some(updated) = pull_remote_settings(self.backend.as_ref(), &settings).await? {
            self.persist_settings(&updated).await?;
            self.state.lock().await.settings = updated;
            self.events.emit(DashboardEvent::SettingsChanged);
        }

        let results = join_all(collections::ALL.iter().map(|&collection| async move {
            (
                collection,
                self.backend.fetch_collection(endpoint_for(collection)).await,
            )
        }))
        .await;

        let mut report = SyncReport::default();
        let mut fetched: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        for (collection, result) in results {
            match result {
                Ok(payload) => {
                    let records =
                        sanitize_collection(collection, unwrap_collection(payload, collection));
                    fetched.insert(collection, records);
                }
                Err(err) => {
                    warn!(
                        "[Service] Fetching {} failed, persisting empty: {}",
                        collection, err
                    );
                    report.failed_collections.push(collection.to_string());
                    fetched.insert(collection, Vec::new());
                }
            }
        }

        let halls = fetched.get(collections::HALLS).cloned().unwrap_or_default();
        self.provision_tables(&halls).await;

        // Merge the status ledger into shows while they are still in memory.
        let movies = fetched
            .get(collections::MOVIES)
            .cloned()
            .unwrap_or_default();
        if let Some(shows) = fetched.get_mut(collections::SHOWS) {
            if let Some(lookup) = self.pull_status_lookup().await {
                report.statuses_applied = apply_statuses(shows, &movies, &lookup).len();
            }
        }

        for (collection, records) in fetched {
            let stored: Vec<StoredRecord> = records
                .into_iter()
                .filter_map(|record| to_stored(collection, record))
                .collect();
            report
                .collection_counts
                .insert(collection.to_string(), stored.len() as i64);
            self.store.replace_collection(collection, stored).await?;
        }
        self.store
            .set_meta(
                LAST_SYNC_META_KEY,
                &Utc::now().timestamp_millis().to_string(),
            )
            .await?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok((info, report))
    }

    /// Status-ledger rows as a title-keyed lookup, or `None` when the
    /// remote DB is unavailable or the table cannot be read.
    async fn pull_status_lookup(
        &self,
    ) -> Option<std::collections::HashMap<String, crate::sync::RemoteStatusRecord>> {
        if !self.state.lock().await.provision.remote_db_available {
            return None;
        }
        match self.backend.list_rows(STATUS_TABLE).await {
            Ok(payload) => Some(parse_status_rows(unwrap_collection(payload, "rows"))),
            Err(err) => {
                debug!("[Service] Status ledger unavailable: {}", err);
                None
            }
        }
    }

    /// Lightweight poll: re-read the remote status ledger and patch local
    /// shows in place, without touching any other collection. Returns the
    /// number of shows whose status changed; an unreadable ledger is a
    /// quiet zero, not an error.
    pub async fn sync_statuses_only(&self, silent: bool) -> Result<usize> {
        if self
            .sync_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(0);
        }
        let _guard = InFlightGuard(&self.sync_in_flight);

        let Some(lookup) = self.pull_status_lookup().await else {
            return Ok(0);
        };
        let mut shows = self.store.collection(collections::SHOWS).await?;
        let movies = self.store.collection(collections::MOVIES).await?;

        let patches = apply_statuses(&mut shows, &movies, &lookup);
        for patch in &patches {
            self.store
                .patch_show_status(&patch.show_key, patch.status, patch.updated_at)
                .await?;
        }
        if !silent && !patches.is_empty() {
            self.events.emit(DashboardEvent::StatusesRefreshed {
                changed: patches.len(),
            });
        }
        Ok(patches.len())
    }

    /// Record a content status for one session: hall-specific statuses land
    /// in the hall's ledger column, the rest in the global one. The local
    /// patch always stands; the remote push is awaited before returning (so
    /// a concurrent poll cannot revert it) but its failure is only logged.
    pub async fn set_session_status(&self, session_id: &str, status: ContentStatus) -> Result<()> {
        let shows = self.store.collection(collections::SHOWS).await?;
        let show = shows
            .iter()
            .filter_map(Value::as_object)
            .find(|map| {
                map.get("id")
                    .and_then(coerce_i64)
                    .map(|id| id.to_string() == session_id)
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::validation(format!("Unknown session: {}", session_id)))?;

        let movie_id = show
            .get("movie_id")
            .and_then(coerce_i64)
            .ok_or_else(|| Error::validation("Session has no movie reference"))?;
        let hall_id = show.get("hall_id").and_then(coerce_i64);

        let movies = self.store.collection(collections::MOVIES).await?;
        let title = movies
            .iter()
            .filter_map(Value::as_object)
            .find(|map| map.get("id").and_then(coerce_i64) == Some(movie_id))
            .and_then(|map| map.get("name").or_else(|| map.get("title")))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("Movie record has no title"))?;
        let title_key = normalize_movie_title(title);

        let now = Utc::now().timestamp_millis();
        self.store.patch_show_status(session_id, status, now).await?;

        let halls = self.store.collection(collections::HALLS).await?;
        self.provision_tables(&halls).await;

        if self.state.lock().await.provision.remote_db_available {
            let column = match hall_id {
                Some(hall_id) if status.is_hall_specific() => hall_column(hall_id),
                _ => GLOBAL_STATUS_COLUMN.to_string(),
            };
            let data = serde_json::json!({
                STATUS_KEY_COLUMN: title_key,
                column: status.as_str(),
                UPDATED_AT_COLUMN: now,
            });
            if let Err(err) = upsert_row(
                self.backend.as_ref(),
                STATUS_TABLE,
                STATUS_KEY_COLUMN,
                &title_key,
                &data,
            )
            .await
            {
                warn!(
                    "[Service] Pushing status for {} failed, local patch stands: {}",
                    title_key, err
                );
            }
        }

        self.events
            .emit(DashboardEvent::StatusesRefreshed { changed: 1 });
        Ok(())
    }

    /// All sessions of a calendar day, joined and sorted by start time.
    pub async fn get_daily_schedule(&self, date: &str) -> Result<Vec<MovieSession>> {
        let shows = self.store.shows_for_date(date).await?;
        self.project(shows).await
    }

    /// One hall's sessions for a calendar day.
    pub async fn get_hall_schedule(&self, hall_id: i64, date: &str) -> Result<Vec<MovieSession>> {
        let shows = self.store.shows_for_hall_date(hall_id, date).await?;
        self.project(shows).await
    }

    async fn project(&self, shows: Vec<Value>) -> Result<Vec<MovieSession>> {
        let movies = self.store.collection(collections::MOVIES).await?;
        let halls = self.store.collection(collections::HALLS).await?;
        let formats = self.store.collection(collections::FORMATS).await?;
        let tickets = self.store.collection(collections::TICKETS).await?;
        let advertisements = self.store.collection(collections::ADVERTISEMENTS).await?;
        let sheet_rows = self.store.collection(collections::SHEET_ROWS).await?;
        Ok(project_sessions(
            &shows,
            &ScheduleJoin {
                movies: &movies,
                halls: &halls,
                formats: &formats,
                tickets: &tickets,
                advertisements: &advertisements,
                sheet_rows: &sheet_rows,
            },
        ))
    }

    pub async fn get_db_stats(&self) -> Result<DbStats> {
        self.store.stats().await
    }

    /// Update one preference. Connection parameters stay local; everything
    /// else is additionally pushed to the shared settings table best-effort.
    pub async fn save_setting(&self, key: &str, value: &str) -> Result<AppSettings> {
        let current = self.settings().await;
        let mut map = match serde_json::to_value(&current)? {
            Value::Object(map) => map,
            _ => return Err(Error::validation("Settings are not an object")),
        };
        if !map.contains_key(key) {
            return Err(Error::validation(format!("Unknown setting: {}", key)));
        }
        map.insert(key.to_string(), crate::settings::parse_setting_value(value));
        let updated: AppSettings = serde_json::from_value(Value::Object(map))?;

        self.persist_settings(&updated).await?;
        {
            let mut state = self.state.lock().await;
            state.settings = updated.clone();
            if LOCAL_AUTHORITATIVE_KEYS.contains(&key) {
                state.provision = ProvisionState::default();
            }
        }
        if LOCAL_AUTHORITATIVE_KEYS.contains(&key) {
            self.backend
                .set_target(&updated.server_url, &updated.api_key);
        } else if self.state.lock().await.provision.remote_db_available {
            push_setting(
                self.backend.as_ref(),
                key,
                value,
                Utc::now().timestamp_millis(),
            )
            .await;
        }
        self.events.emit(DashboardEvent::SettingsChanged);
        Ok(updated)
    }

    async fn persist_settings(&self, settings: &AppSettings) -> Result<()> {
        let raw = serde_json::to_string(settings)?;
        self.store.set_meta(SETTINGS_STORAGE_KEY, &raw).await
    }
}

/// HTTP path segment for a collection. Only the spreadsheet mirror differs
/// from its local name.
fn endpoint_for(collection: &str) -> &str {
    match collection {
        collections::SHEET_ROWS => "google-sheets",
        other => other,
    }
}

fn to_stored(collection: &str, record: Value) -> Option<StoredRecord> {
    let key = record_key(collection, &record)?;
    let (show_date, hall_id) = if collection == collections::SHOWS {
        (
            record
                .get("date")
                .and_then(Value::as_str)
                .map(str::to_string),
            record.get("hall_id").and_then(coerce_i64),
        )
    } else {
        (None, None)
    };
    Some(StoredRecord {
        key,
        show_date,
        hall_id,
        payload: record,
    })
}
