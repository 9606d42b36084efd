//! Car Store Server Library
//!
//! Persists car listings to PostgreSQL or SQLite behind a small JSON HTTP API.
//! The connection pool manager in [`db`] retries transient failures and
//! rebuilds the pool after fatal connection errors.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod transport;

pub use config::Config;
pub use error::{DbError, StoreError};
pub use store::CarStore;
