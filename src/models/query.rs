//! Statement and result models shared by the pool and the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Declared type of a NULL parameter.
///
/// PostgreSQL types every bind parameter, so a NULL must carry the type of the
/// column it is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullKind {
    Bool,
    Int,
    Float,
    Text,
    Json,
    Timestamp,
}

/// Rust types that map to a single [`NullKind`].
pub trait ParamKind {
    const NULL_KIND: NullKind;
}

impl ParamKind for bool {
    const NULL_KIND: NullKind = NullKind::Bool;
}
impl ParamKind for i32 {
    const NULL_KIND: NullKind = NullKind::Int;
}
impl ParamKind for i64 {
    const NULL_KIND: NullKind = NullKind::Int;
}
impl ParamKind for f64 {
    const NULL_KIND: NullKind = NullKind::Float;
}
impl ParamKind for String {
    const NULL_KIND: NullKind = NullKind::Text;
}
impl ParamKind for &str {
    const NULL_KIND: NullKind = NullKind::Text;
}
impl ParamKind for JsonValue {
    const NULL_KIND: NullKind = NullKind::Json;
}
impl ParamKind for DateTime<Utc> {
    const NULL_KIND: NullKind = NullKind::Timestamp;
}

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Null(NullKind),
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    String(String),
    /// Bound as JSONB on PostgreSQL, as text on SQLite
    Json(JsonValue),
    Timestamp(DateTime<Utc>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null(_) => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<JsonValue> for QueryParam {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl From<DateTime<Utc>> for QueryParam {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<QueryParam> + ParamKind> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null(T::NULL_KIND))
    }
}

/// SQL text plus positional (`$1`, `$2`, ...) parameters.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append the next positional parameter.
    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }
}

/// Rows returned by a statement, decoded into JSON maps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Rows returned for queries, rows affected for plain writes.
    pub row_count: u64,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take ownership of the first row, if any.
    pub fn into_first(self) -> Option<serde_json::Map<String, JsonValue>> {
        self.rows.into_iter().next()
    }
}
