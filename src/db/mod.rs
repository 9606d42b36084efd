//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management with retry and reconnect
//! - Statement execution
//! - Row decoding
//! - Pool error events and health probing
//! - Table DDL
//! - Database dispatch macros for reducing code duplication

pub mod backoff;
pub mod events;
pub mod executor;
pub mod macros;
pub mod pool;
pub mod schema;
pub mod types;

pub use backoff::{FailureContext, RetryPolicy, retry};
pub use events::{HealthMonitor, PoolEvent};
pub use pool::{DbConnection, DbPool, PoolManager, PoolStats};
