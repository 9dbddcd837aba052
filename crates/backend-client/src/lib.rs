//! HTTP implementation of the dashboard's remote backend seam.

pub mod client;
pub mod error;

pub use client::BackendClient;
pub use error::{BackendError, Result};
