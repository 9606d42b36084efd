//! Car listing models.
//!
//! `NewCar` and `CarUpdate` are the write-side shapes accepted from callers.
//! `CarRecord` is the stored row as returned to callers, built from a decoded
//! JSON row via [`CarRecord::from_row`].

use crate::models::QueryParam;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Listing status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarStatus {
    #[default]
    Available,
    Reserved,
    Sold,
}

impl CarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Sold => "sold",
        }
    }
}

impl std::fmt::Display for CarStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A car listing as submitted for insertion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCar {
    pub custom_id: String,
    #[serde(default)]
    pub source_message_id: Option<i64>,
    #[serde(default)]
    pub source_channel_name: Option<String>,
    #[serde(default)]
    pub target_channel_message_id: Option<i64>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "price_input")]
    pub price: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    /// Missing or null means no photos.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub photos: Vec<String>,
    #[serde(default)]
    pub status: Option<CarStatus>,
}

impl NewCar {
    /// Minimal record with only the business key set.
    pub fn new(custom_id: impl Into<String>) -> Self {
        Self {
            custom_id: custom_id.into(),
            ..Self::default()
        }
    }

    /// Field checks the storage layer cannot be trusted to make.
    pub fn validate(&self) -> Result<(), String> {
        if self.custom_id.trim().is_empty() {
            return Err("custom_id must not be empty".to_string());
        }
        check_price(self.price)
    }
}

/// Columns that a partial update may touch.
///
/// `custom_id`, `id` and the timestamps are deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarColumn {
    SourceMessageId,
    SourceChannelName,
    TargetChannelMessageId,
    Brand,
    Model,
    Year,
    Price,
    Description,
    Photos,
    Status,
}

impl CarColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::SourceMessageId => "source_message_id",
            Self::SourceChannelName => "source_channel_name",
            Self::TargetChannelMessageId => "target_channel_message_id",
            Self::Brand => "brand",
            Self::Model => "model",
            Self::Year => "year",
            Self::Price => "price",
            Self::Description => "description",
            Self::Photos => "photos",
            Self::Status => "status",
        }
    }
}

/// Partial update of a car listing. Absent (or null) fields are left as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarUpdate {
    #[serde(default)]
    pub source_message_id: Option<i64>,
    #[serde(default)]
    pub source_channel_name: Option<String>,
    #[serde(default)]
    pub target_channel_message_id: Option<i64>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "price_input")]
    pub price: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photos: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<CarStatus>,
}

impl CarUpdate {
    /// Column/value pairs for every field that is set, in column order.
    pub fn assignments(&self) -> Vec<(CarColumn, QueryParam)> {
        let mut out = Vec::new();
        if let Some(v) = self.source_message_id {
            out.push((CarColumn::SourceMessageId, QueryParam::Int(v)));
        }
        if let Some(v) = &self.source_channel_name {
            out.push((CarColumn::SourceChannelName, QueryParam::String(v.clone())));
        }
        if let Some(v) = self.target_channel_message_id {
            out.push((CarColumn::TargetChannelMessageId, QueryParam::Int(v)));
        }
        if let Some(v) = &self.brand {
            out.push((CarColumn::Brand, QueryParam::String(v.clone())));
        }
        if let Some(v) = &self.model {
            out.push((CarColumn::Model, QueryParam::String(v.clone())));
        }
        if let Some(v) = self.year {
            out.push((CarColumn::Year, QueryParam::Int(v.into())));
        }
        if let Some(v) = self.price {
            out.push((CarColumn::Price, QueryParam::Float(v)));
        }
        if let Some(v) = &self.description {
            out.push((CarColumn::Description, QueryParam::String(v.clone())));
        }
        if let Some(v) = &self.photos {
            out.push((CarColumn::Photos, photos_param(v)));
        }
        if let Some(v) = self.status {
            out.push((CarColumn::Status, QueryParam::String(v.as_str().to_string())));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        check_price(self.price)
    }
}

/// Largest price a `NUMERIC(12,2)` column holds.
pub const MAX_PRICE: f64 = 9_999_999_999.99;

/// Prices must be finite and fit the column on every backend.
pub fn check_price(price: Option<f64>) -> Result<(), String> {
    match price {
        Some(p) if !p.is_finite() => Err(format!("price must be a finite number, got {}", p)),
        Some(p) if p.abs() > MAX_PRICE => {
            Err(format!("price {} is out of range (max {})", p, MAX_PRICE))
        }
        _ => Ok(()),
    }
}

/// Photos are stored as a JSON array.
pub fn photos_param(photos: &[String]) -> QueryParam {
    QueryParam::Json(JsonValue::Array(
        photos.iter().cloned().map(JsonValue::String).collect(),
    ))
}

/// A stored car listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarRecord {
    pub id: i64,
    pub custom_id: String,
    #[serde(default)]
    pub source_message_id: Option<i64>,
    #[serde(default)]
    pub source_channel_name: Option<String>,
    #[serde(default)]
    pub target_channel_message_id: Option<i64>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub status: CarStatus,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl CarRecord {
    /// Build a record from a decoded row, normalizing `photos` first.
    pub fn from_row(mut row: serde_json::Map<String, JsonValue>) -> Result<Self, String> {
        let photos = normalize_photos(row.get("photos").unwrap_or(&JsonValue::Null));
        let custom_id = row
            .get("custom_id")
            .and_then(JsonValue::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        row.insert(
            "photos".to_string(),
            JsonValue::Array(photos.into_iter().map(JsonValue::String).collect()),
        );
        serde_json::from_value(JsonValue::Object(row))
            .map_err(|e| format!("Failed to decode car '{}': {}", custom_id, e))
    }
}

/// One page of listings plus the total number of rows.
#[derive(Debug, Clone, Serialize)]
pub struct CarPage {
    pub records: Vec<CarRecord>,
    pub total: u64,
}

/// Turn a stored `photos` value into a list of URLs.
///
/// Arrays keep their string entries; text is decoded as JSON; anything that
/// cannot be decoded becomes an empty list.
pub fn normalize_photos(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        JsonValue::String(text) => match serde_json::from_str::<JsonValue>(text) {
            Ok(decoded @ JsonValue::Array(_)) => normalize_photos(&decoded),
            Ok(_) | Err(_) => {
                tracing::warn!(photos = %text, "Stored photos are not a JSON array, using []");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept numbers or numeric strings; decimals may arrive as text.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => Ok(n.as_f64()),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

/// `lenient_f64` plus the range check for caller-supplied prices.
fn price_input<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let price = lenient_f64(deserializer)?;
    check_price(price).map_err(serde::de::Error::custom)?;
    Ok(price)
}

/// RFC 3339, or the `YYYY-MM-DD HH:MM:SS` form SQLite's CURRENT_TIMESTAMP writes.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
