//! Database dispatch macros for reducing code duplication.
//!
//! `DbPool` and `DbConnection` both come in one variant per backend. The
//! macro below generates the `match` over those variants while keeping each
//! arm readable at the call site.

/// Macro for generating database dispatch match arms.
///
/// The first token names the enum in `crate::db::pool` to match on.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbPool: pool, {
///     Postgres(p) => p.size(),
///     SQLite(p) => p.size(),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($kind:ident : $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $crate::db::pool::$kind::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
