//! Data models for the car store server.
//!
//! This module re-exports all model types used throughout the application.

pub mod car;
pub mod connection;
pub mod query;

// Re-export commonly used types
pub use car::{CarColumn, CarPage, CarRecord, CarStatus, CarUpdate, NewCar, normalize_photos};
pub use connection::DatabaseType;
pub use query::{NullKind, ParamKind, QueryParam, ResultSet, Statement};
