//! Statement execution on a checked-out connection.
//!
//! The executor uses database-specific implementations organized in submodules
//! (`postgres`, `sqlite`). Each provides the same interface adapted to its
//! database's type system; the pool manager decides which one to call.

use crate::db::types::{RowToJson, format_timestamp};
use crate::error::{DbError, DbResult};
use crate::models::{NullKind, QueryParam, ResultSet, Statement};
use futures_util::TryStreamExt;
use sqlx::Either;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Decode collected rows into a `ResultSet`.
fn process_rows<R: RowToJson>(rows: Vec<R>, rows_affected: u64) -> ResultSet {
    let columns = rows
        .first()
        .map(|r| r.get_column_names())
        .unwrap_or_default();
    let row_count = if rows.is_empty() {
        rows_affected
    } else {
        rows.len() as u64
    };
    ResultSet {
        columns,
        rows: rows.iter().map(|r| r.to_json_map()).collect(),
        row_count,
    }
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    DbError::timeout(operation, limit.as_millis() as u64)
}

fn log_statement(stmt: &Statement, start: Instant, row_count: u64) {
    debug!(
        sql = %stmt.sql,
        params = stmt.params.len(),
        row_count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Statement executed"
    );
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// The code structure is intentionally parallel to make differences obvious.

pub(crate) mod postgres {
    use super::*;
    use sqlx::postgres::{PgArguments, PgConnection};
    use sqlx::{Executor, Postgres};

    /// Run one statement. Without parameters the raw SQL goes through the
    /// simple protocol, which also allows several `;`-separated statements.
    pub async fn run(
        conn: &mut PgConnection,
        stmt: &Statement,
        limit: Duration,
    ) -> DbResult<ResultSet> {
        let start = Instant::now();
        let work = async {
            let mut rows = Vec::new();
            let mut affected = 0u64;
            let mut stream = if stmt.params.is_empty() {
                (&mut *conn).fetch_many(stmt.sql.as_str())
            } else {
                let mut query = sqlx::query(&stmt.sql);
                for param in &stmt.params {
                    query = bind_param(query, param);
                }
                (&mut *conn).fetch_many(query)
            };
            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(done) => affected += done.rows_affected(),
                    Either::Right(row) => rows.push(row),
                }
            }
            Ok::<_, sqlx::Error>((rows, affected))
        };

        match timeout(limit, work).await {
            Ok(Ok((rows, affected))) => {
                let result = process_rows(rows, affected);
                log_statement(stmt, start, result.row_count);
                Ok(result)
            }
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", limit)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Postgres, PgArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        match param {
            QueryParam::Null(kind) => match kind {
                NullKind::Bool => query.bind(None::<bool>),
                NullKind::Int => query.bind(None::<i64>),
                NullKind::Float => query.bind(None::<f64>),
                NullKind::Text => query.bind(None::<String>),
                NullKind::Json => query.bind(None::<sqlx::types::Json<serde_json::Value>>),
                NullKind::Timestamp => query.bind(None::<chrono::DateTime<chrono::Utc>>),
            },
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Json(v) => query.bind(sqlx::types::Json(v)),
            QueryParam::Timestamp(v) => query.bind(*v),
        }
    }
}

pub(crate) mod sqlite {
    use super::*;
    use sqlx::sqlite::{SqliteArguments, SqliteConnection};
    use sqlx::{Executor, Sqlite};

    pub async fn run(
        conn: &mut SqliteConnection,
        stmt: &Statement,
        limit: Duration,
    ) -> DbResult<ResultSet> {
        let start = Instant::now();
        let work = async {
            let mut rows = Vec::new();
            let mut affected = 0u64;
            let mut stream = if stmt.params.is_empty() {
                (&mut *conn).fetch_many(stmt.sql.as_str())
            } else {
                let mut query = sqlx::query(&stmt.sql);
                for param in &stmt.params {
                    query = bind_param(query, param);
                }
                (&mut *conn).fetch_many(query)
            };
            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(done) => affected += done.rows_affected(),
                    Either::Right(row) => rows.push(row),
                }
            }
            Ok::<_, sqlx::Error>((rows, affected))
        };

        match timeout(limit, work).await {
            Ok(Ok((rows, affected))) => {
                let result = process_rows(rows, affected);
                log_statement(stmt, start, result.row_count);
                Ok(result)
            }
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("statement execution", limit)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match param {
            QueryParam::Null(_) => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            // SQLite doesn't have native JSON type, store as string
            QueryParam::Json(v) => query.bind(v.to_string()),
            // Fixed-width text keeps lexical order equal to time order
            QueryParam::Timestamp(v) => query.bind(format_timestamp(v)),
        }
    }
}
