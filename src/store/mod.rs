//! Car listing persistence.
//!
//! [`CarStore`] is the only component that writes SQL for the `cars` table.
//! Every statement goes through [`PoolManager::execute_query`], so it inherits
//! the manager's retry and reconnect behavior; failures come back as
//! [`StoreError`](crate::error::StoreError).
//!
//! [`PoolManager::execute_query`]: crate::db::PoolManager::execute_query

mod cars;

pub use cars::CarStore;
