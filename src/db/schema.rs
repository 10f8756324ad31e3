//! SQL DDL for initializing the saved-account storage.

/// SQLite schema with:
/// - `id` INTEGER PRIMARY KEY AUTOINCREMENT
/// - `device_id` UNIQUE, one saved account per device
/// - `secret` stored as given (no encryption at rest)
/// - `saved_at` RFC3339 timestamp of the last save
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS saved_accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    secret TEXT NOT NULL,
    device_id TEXT NOT NULL UNIQUE,
    saved_at TEXT NOT NULL
);
"#;
