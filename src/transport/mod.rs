//! Transport layer for the car store server.
//!
//! - `routes`: the axum router, JSON handlers and shared request state
//! - `http`: the TCP listener loop with graceful shutdown

pub mod http;
pub mod routes;

pub use http::HttpTransport;
pub use routes::{AppState, router};

use crate::error::DbResult;
use std::future::Future;

/// A server front end for the store.
pub trait Transport: Send + Sync {
    /// Serve until shut down. Blocks for the lifetime of the server.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}
