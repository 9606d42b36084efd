//! DDL for the `cars` table.
//!
//! Creation is additive and idempotent (`IF NOT EXISTS`). On PostgreSQL two
//! follow-up statements relax `NOT NULL` on `year` and `price`, which older
//! deployments declared as required; their failures are expected once applied
//! and are ignored by the caller.

use crate::models::DatabaseType;

const POSTGRES_CREATE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cars (
        id SERIAL PRIMARY KEY,
        custom_id VARCHAR(255) UNIQUE NOT NULL,
        source_message_id BIGINT,
        source_channel_name VARCHAR(255),
        target_channel_message_id BIGINT,
        brand VARCHAR(255),
        model VARCHAR(255),
        year INTEGER,
        price NUMERIC(12,2),
        description TEXT,
        photos JSONB,
        status VARCHAR(50) NOT NULL DEFAULT 'available',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_cars_source ON cars (source_message_id, source_channel_name)",
    "CREATE INDEX IF NOT EXISTS idx_cars_created_at ON cars (created_at DESC)",
];

const POSTGRES_RELAX: &[&str] = &[
    "ALTER TABLE cars ALTER COLUMN year DROP NOT NULL",
    "ALTER TABLE cars ALTER COLUMN price DROP NOT NULL",
];

const SQLITE_CREATE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cars (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        custom_id TEXT NOT NULL UNIQUE,
        source_message_id INTEGER,
        source_channel_name TEXT,
        target_channel_message_id INTEGER,
        brand TEXT,
        model TEXT,
        year INTEGER,
        price REAL,
        description TEXT,
        photos TEXT,
        status TEXT NOT NULL DEFAULT 'available',
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_cars_source ON cars (source_message_id, source_channel_name)",
    "CREATE INDEX IF NOT EXISTS idx_cars_created_at ON cars (created_at DESC)",
];

/// Statements that create the table and indexes if missing.
pub fn create_statements(db: DatabaseType) -> &'static [&'static str] {
    match db {
        DatabaseType::PostgreSQL => POSTGRES_CREATE,
        DatabaseType::SQLite => SQLITE_CREATE,
    }
}

/// Best-effort nullability relaxation. SQLite columns are already nullable.
pub fn relax_statements(db: DatabaseType) -> &'static [&'static str] {
    match db {
        DatabaseType::PostgreSQL => POSTGRES_RELAX,
        DatabaseType::SQLite => &[],
    }
}

/// Column list for reads. PostgreSQL NUMERIC comes back as float8 so rows
/// decode to plain JSON numbers.
pub fn car_columns(db: DatabaseType) -> &'static str {
    match db {
        DatabaseType::PostgreSQL => {
            "id, custom_id, source_message_id, source_channel_name, target_channel_message_id, \
             brand, model, year, price::float8 AS price, description, photos, status, \
             created_at, updated_at"
        }
        DatabaseType::SQLite => {
            "id, custom_id, source_message_id, source_channel_name, target_channel_message_id, \
             brand, model, year, price, description, photos, status, created_at, updated_at"
        }
    }
}
