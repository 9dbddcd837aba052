//! SQLite persistence for the dashboard, built on diesel and r2d2.

pub mod db;
pub mod errors;
pub mod schema;
pub mod store;

pub use db::{create_pool, get_connection, run_migrations, DbPool, WriteHandle};
pub use errors::StorageError;
pub use store::SqliteStore;
