//! Diesel-backed implementation of the dashboard's local store.
//!
//! Every collection lives in one `records` table keyed by
//! `(collection, record_key)`, with denormalized date and hall columns so
//! the schedule queries stay indexed. Payloads are stored as JSON text.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use log::warn;
use serde_json::Value;

use kinodesk_core::status::ContentStatus;
use kinodesk_core::sync::{collections, DbStats, LocalStore, StoredRecord, LAST_SYNC_META_KEY};
use kinodesk_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{kv_store, records};

/// Insert batches stay well under SQLite's bind-parameter limit
/// (five columns per row).
const INSERT_CHUNK_SIZE: usize = 150;

#[derive(Queryable, Insertable)]
#[diesel(table_name = records)]
struct RecordRow {
    collection: String,
    record_key: String,
    show_date: Option<String>,
    hall_id: Option<i64>,
    payload: String,
}

#[derive(Insertable)]
#[diesel(table_name = kv_store)]
struct KvRow {
    key: String,
    value: String,
}

fn to_row(collection: &str, record: StoredRecord) -> Result<RecordRow> {
    Ok(RecordRow {
        collection: collection.to_string(),
        record_key: record.key,
        show_date: record.show_date,
        hall_id: record.hall_id,
        payload: serde_json::to_string(&record.payload)?,
    })
}

/// Parse stored payloads, dropping rows that no longer deserialize instead
/// of failing the whole query.
fn parse_payloads(raw: Vec<String>) -> Vec<Value> {
    raw.into_iter()
        .filter_map(|text| match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("[Storage] Dropping unreadable record payload: {}", err);
                None
            }
        })
        .collect()
}

pub struct SqliteStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        let writer = WriteHandle::new(Arc::clone(&pool));
        Self { pool, writer }
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn replace_collection(
        &self,
        collection: &str,
        new_records: Vec<StoredRecord>,
    ) -> Result<()> {
        let name = collection.to_string();
        let rows: Vec<RecordRow> = new_records
            .into_iter()
            .map(|record| to_row(&name, record))
            .collect::<Result<_>>()?;

        self.writer
            .exec(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::delete(records::table.filter(records::collection.eq(&name)))
                        .execute(conn)?;
                    for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                        diesel::insert_into(records::table)
                            .values(chunk)
                            .execute(conn)?;
                    }
                    Ok(())
                })
                .map_err(StorageError::Database)?;
                Ok(())
            })
            .await
    }

    async fn collection(&self, collection: &str) -> Result<Vec<Value>> {
        let mut conn = get_connection(&self.pool)?;
        let raw = records::table
            .filter(records::collection.eq(collection))
            .order(records::record_key.asc())
            .select(records::payload)
            .load::<String>(&mut conn)
            .map_err(StorageError::Database)?;
        Ok(parse_payloads(raw))
    }

    async fn shows_for_date(&self, date: &str) -> Result<Vec<Value>> {
        let mut conn = get_connection(&self.pool)?;
        let raw = records::table
            .filter(records::collection.eq(collections::SHOWS))
            .filter(records::show_date.eq(date))
            .select(records::payload)
            .load::<String>(&mut conn)
            .map_err(StorageError::Database)?;
        Ok(parse_payloads(raw))
    }

    async fn shows_for_hall_date(&self, hall_id: i64, date: &str) -> Result<Vec<Value>> {
        let mut conn = get_connection(&self.pool)?;
        let raw = records::table
            .filter(records::collection.eq(collections::SHOWS))
            .filter(records::hall_id.eq(hall_id))
            .filter(records::show_date.eq(date))
            .select(records::payload)
            .load::<String>(&mut conn)
            .map_err(StorageError::Database)?;
        Ok(parse_payloads(raw))
    }

    async fn patch_show_status(
        &self,
        show_key: &str,
        status: ContentStatus,
        updated_at: i64,
    ) -> Result<()> {
        let key = show_key.to_string();
        self.writer
            .exec(move |conn| {
                let existing = records::table
                    .filter(records::collection.eq(collections::SHOWS))
                    .filter(records::record_key.eq(&key))
                    .select(records::payload)
                    .first::<String>(conn)
                    .optional()
                    .map_err(StorageError::Database)?;
                // A show that vanished between sync and patch is not an error.
                let Some(raw) = existing else {
                    return Ok(());
                };

                let mut payload: Value =
                    serde_json::from_str(&raw).map_err(StorageError::Payload)?;
                if let Some(map) = payload.as_object_mut() {
                    map.insert(
                        "content_status".to_string(),
                        Value::String(status.as_str().to_string()),
                    );
                    map.insert("status_updated_at".to_string(), Value::from(updated_at));
                }
                let updated = serde_json::to_string(&payload)?;

                diesel::update(
                    records::table
                        .filter(records::collection.eq(collections::SHOWS))
                        .filter(records::record_key.eq(&key)),
                )
                .set(records::payload.eq(updated))
                .execute(conn)
                .map_err(StorageError::Database)?;
                Ok(())
            })
            .await
    }

    async fn get_meta(&self, meta_key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let value = kv_store::table
            .filter(kv_store::key.eq(meta_key))
            .select(kv_store::value)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::Database)?;
        Ok(value)
    }

    async fn set_meta(&self, meta_key: &str, meta_value: &str) -> Result<()> {
        let row = KvRow {
            key: meta_key.to_string(),
            value: meta_value.to_string(),
        };
        self.writer
            .exec(move |conn| {
                diesel::replace_into(kv_store::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::Database)?;
                Ok(())
            })
            .await
    }

    async fn stats(&self) -> Result<DbStats> {
        let mut conn = get_connection(&self.pool)?;
        let counted = records::table
            .group_by(records::collection)
            .select((records::collection, diesel::dsl::count_star()))
            .load::<(String, i64)>(&mut conn)
            .map_err(StorageError::Database)?;
        // Release the pooled connection before `get_meta` acquires its own.
        drop(conn);

        let mut counts: BTreeMap<String, i64> = collections::ALL
            .iter()
            .map(|name| (name.to_string(), 0))
            .collect();
        counts.extend(counted);

        let last_sync_at = self
            .get_meta(LAST_SYNC_META_KEY)
            .await?
            .and_then(|raw| raw.parse().ok());
        Ok(DbStats {
            counts,
            last_sync_at,
        })
    }
}
