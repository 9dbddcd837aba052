//! Connection pool, embedded migrations and the single-writer handle.

use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use crate::errors::StorageError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const POOL_SIZE: u32 = 5;

/// Build the pool for the database at `db_path` and bring the schema up to
/// date. SQLite tolerates one writer at a time; WAL plus a busy timeout
/// keeps concurrent readers happy while [`WriteHandle`] serializes writes.
pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>, StorageError> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;

    let mut conn = pool.get()?;
    conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        .map_err(StorageError::Database)?;
    run_migrations(&mut conn)?;

    Ok(Arc::new(pool))
}

pub fn run_migrations(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| StorageError::Migration(err.to_string()))?;
    if !applied.is_empty() {
        info!("[Storage] Applied {} pending migration(s)", applied.len());
    }
    Ok(())
}

pub fn get_connection(pool: &Arc<DbPool>) -> Result<DbConnection, StorageError> {
    Ok(pool.get()?)
}

/// Runs write closures on the blocking thread pool, one connection per
/// call. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct WriteHandle {
    pool: Arc<DbPool>,
}

impl WriteHandle {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    pub async fn exec<F, T>(&self, f: F) -> kinodesk_core::Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> kinodesk_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            f(&mut conn)
        })
        .await
        .map_err(|err| StorageError::Join(err.to_string()))?
    }
}
