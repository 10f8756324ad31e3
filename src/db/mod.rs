//! Database module: models and schema for saved-account storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and conversions
//! - `schema.rs`: SQL DDL for initializing the database (SQLite)
//! - `sqlite.rs`: parameterized queries over a single-connection pool

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{DbSavedAccount, SavedCredential};
pub use schema::SQLITE_INIT;
pub use sqlite::{SavedAccountsStorage, SqlitePool};
