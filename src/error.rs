//! Error types for the car store server.
//!
//! Two layers are defined here using `thiserror`:
//! - [`DbError`] describes failures of the connection pool and statement
//!   execution. It knows whether a failure is connection-level, which drives
//!   pool recreation in the retry loop.
//! - [`StoreError`] is the domain taxonomy returned by the car store and
//!   rendered by the HTTP layer as a status code plus JSON body.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// SQLSTATE codes (outside class 08) that mean the server dropped the session.
const SHUTDOWN_SQL_STATES: &[&str] = &["57P01", "57P02", "57P03"];

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Unique constraint violated: {message}")]
    UniqueViolation {
        message: String,
        constraint: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Could not obtain a live connection after {attempts} attempts: {message}")]
    PoolExhausted { attempts: u32, message: String },

    /// Every connection is checked out and none came back in time. The pool
    /// itself is healthy, so this never triggers recreation.
    #[error("All {max_connections} connections busy, waited {waited_ms}ms")]
    PoolSaturated { max_connections: u32, waited_ms: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create a pool exhausted error.
    pub fn pool_exhausted(attempts: u32, message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            attempts,
            message: message.into(),
        }
    }

    pub fn pool_saturated(max_connections: u32, waited_ms: u64) -> Self {
        Self::PoolSaturated {
            max_connections,
            waited_ms,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// SQLSTATE (or SQLite extended result code) reported by the backend.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// True when the failure means the connection (or the whole pool) is gone
    /// rather than the statement being wrong. These trigger pool recreation.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::PoolExhausted { .. }
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// False for failures that repeat identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::UniqueViolation { .. } | Self::InvalidInput { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// Classification relies on structured error kinds and SQLSTATE codes only.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return DbError::UniqueViolation {
                        message: db_err.message().to_string(),
                        constraint: db_err.constraint().map(String::from),
                    };
                }
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    Some(c) if c.starts_with("08") || SHUTDOWN_SQL_STATES.contains(&c) => {
                        DbError::connection(
                            format!("{} (SQLSTATE: {})", db_err.message(), c),
                            "The database server closed the session; the pool will be recreated",
                        )
                    }
                    _ => DbError::database(
                        db_err.message(),
                        code,
                        "Check the SQL syntax and referenced objects",
                    ),
                }
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 0),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error ({:?}): {}", io_err.kind(), io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Store (domain) errors
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Car with custom_id '{custom_id}' already exists")]
    Conflict { custom_id: String },

    #[error("Car with custom_id '{custom_id}' not found")]
    NotFound { custom_id: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Database unavailable: {message}")]
    Unavailable { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn conflict(custom_id: impl Into<String>) -> Self {
        Self::Conflict {
            custom_id: custom_id.into(),
        }
    }

    pub fn not_found(custom_id: impl Into<String>) -> Self {
        Self::NotFound {
            custom_id: custom_id.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Machine-readable error code used in HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Unavailable { .. } => "unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_connection_level() || matches!(err, DbError::PoolSaturated { .. }) {
            return StoreError::Unavailable {
                message: err.to_string(),
            };
        }
        match err {
            DbError::InvalidInput { message } => StoreError::InvalidArgument { message },
            other => StoreError::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Seconds a client should wait before retrying after a 503.
const RETRY_AFTER_SECS: &str = "5";

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = Json(ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        });

        match self {
            StoreError::Unavailable { .. } => {
                (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(err.sql_state(), Some("42601"));
    }

    #[test]
    fn test_connection_level_classification() {
        assert!(DbError::timeout("query", 30).is_connection_level());
        assert!(DbError::connection("err", "sugg").is_connection_level());
        assert!(DbError::pool_exhausted(3, "refused").is_connection_level());
        assert!(!DbError::invalid_input("bad").is_connection_level());
        assert!(!DbError::database("syntax", None, "fix it").is_connection_level());
    }

    #[test]
    fn test_retryable_classification() {
        let unique = DbError::UniqueViolation {
            message: "duplicate key".into(),
            constraint: Some("cars_custom_id_key".into()),
        };
        assert!(!unique.is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
        assert!(DbError::database("deadlock", Some("40P01".into()), "").is_retryable());
        assert!(DbError::timeout("query", 30).is_retryable());
    }

    #[test]
    fn test_pool_errors_are_connection_level() {
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_connection_level());
        assert!(DbError::from(sqlx::Error::PoolClosed).is_connection_level());
    }

    #[test]
    fn test_io_error_is_connection_level() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = DbError::from(sqlx::Error::Io(io));
        assert!(err.is_connection_level());
        assert!(err.to_string().contains("ConnectionReset"));
    }

    #[test]
    fn test_decode_error_is_not_connection_level() {
        let err = DbError::from(sqlx::Error::ColumnNotFound("photos".to_string()));
        assert!(!err.is_connection_level());
        assert!(matches!(err, DbError::Internal { .. }));
    }

    #[test]
    fn test_store_error_from_connection_error_is_unavailable() {
        let err: StoreError = DbError::pool_exhausted(3, "refused").into();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn test_saturated_pool_is_unavailable_but_not_fatal() {
        let err = DbError::pool_saturated(1, 1000);
        assert!(!err.is_connection_level());
        assert!(err.is_retryable());
        let err: StoreError = err.into();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn test_store_error_from_invalid_input() {
        let err: StoreError = DbError::invalid_input("empty").into();
        assert!(matches!(err, StoreError::InvalidArgument { .. }));
    }

    #[test]
    fn test_store_error_from_database_error_is_internal() {
        let err: StoreError = DbError::database("boom", None, "").into();
        assert!(matches!(err, StoreError::Internal { .. }));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StoreError::conflict("a").status_code(), StatusCode::CONFLICT);
        assert_eq!(StoreError::not_found("a").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            StoreError::invalid_argument("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StoreError::Unavailable {
                message: "down".into()
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            StoreError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unavailable_response_sets_retry_after() {
        let response = StoreError::Unavailable {
            message: "down".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            RETRY_AFTER_SECS
        );
    }

    #[test]
    fn test_conflict_response_has_no_retry_after() {
        let response = StoreError::conflict("car-1").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
