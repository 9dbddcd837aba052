//! Domain core for the Kinodesk cinema operations dashboard.
//!
//! This crate owns the data model (sessions, content statuses, settings),
//! the normalization/sanitization layer for loosely-typed backend payloads,
//! the session projector, and the aggregation/sync services. Network and
//! storage are reached through the `RemoteBackend` and `LocalStore` traits
//! implemented by the sibling crates.

pub mod errors;
pub mod events;
pub mod sanitize;
pub mod schedule;
pub mod settings;
pub mod status;
pub mod sync;
pub mod titles;

pub use errors::{Error, Result};
