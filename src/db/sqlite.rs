use crate::db::models::DbSavedAccount;
use crate::db::schema::SQLITE_INIT;
use crate::error::LinkError;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::{info, warn};

pub type SqlitePool = Pool<Sqlite>;

pub struct SavedAccountsStorage {
    pool: SqlitePool,
    options: SqliteConnectOptions,
}

impl SavedAccountsStorage {
    /// Open (creating if missing) the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, LinkError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = Self::open_pool(&options).await?;
        info!(database_url, "Connection to SQLite has been established");
        Ok(Self { pool, options })
    }

    async fn open_pool(options: &SqliteConnectOptions) -> Result<SqlitePool, LinkError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        Ok(pool)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reopen the pool if it has been closed underneath us.
    pub async fn ensure_open(&mut self) -> Result<(), LinkError> {
        if self.pool.is_closed() {
            warn!("SQLite pool found closed; reopening");
            self.pool = Self::open_pool(&self.options).await?;
        }
        Ok(())
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), LinkError> {
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert or replace the account for `device_id`.
    /// Returns true when an existing account was overwritten.
    pub async fn upsert(
        &self,
        username: &str,
        secret: &str,
        device_id: &str,
    ) -> Result<bool, LinkError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM saved_accounts WHERE device_id = ?")
                .bind(device_id)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO saved_accounts (username, secret, device_id, saved_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(device_id) DO UPDATE SET
                username=excluded.username,
                secret=excluded.secret,
                saved_at=excluded.saved_at
            "#,
        )
        .bind(username)
        .bind(secret)
        .bind(device_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(existing.is_some())
    }

    pub async fn exists(&self, device_id: &str) -> Result<bool, LinkError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(1) FROM saved_accounts WHERE device_id = ?")
                .bind(device_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Most recently saved account for `device_id`, if any.
    pub async fn get_by_device_id(
        &self,
        device_id: &str,
    ) -> Result<Option<DbSavedAccount>, LinkError> {
        let row = sqlx::query_as::<_, DbSavedAccount>(
            r#"SELECT id, username, secret, device_id, saved_at
               FROM saved_accounts WHERE device_id = ?
               ORDER BY id DESC LIMIT 1"#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_rows(&self) -> Result<i64, LinkError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(1) FROM saved_accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_db(tag: &str) -> (PathBuf, String) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!(
            "geyser-link-{tag}-{}-{}.sqlite",
            std::process::id(),
            nanos
        ));
        let url = format!("sqlite:{}", path.display());
        (path, url)
    }

    #[tokio::test]
    async fn upsert_reports_overwrite_and_keeps_one_row() {
        let (path, url) = temp_db("storage-upsert");
        let storage = SavedAccountsStorage::connect(&url).await.expect("connect");
        storage.init_schema().await.expect("schema");

        assert!(!storage.upsert("alex", "one", "dev-1").await.expect("first"));
        assert!(storage.upsert("alex", "two", "dev-1").await.expect("second"));
        assert_eq!(storage.count_rows().await.expect("count"), 1);

        let row = storage
            .get_by_device_id("dev-1")
            .await
            .expect("query")
            .expect("row");
        assert_eq!(row.secret, "two");

        storage.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn values_are_bound_not_interpolated() {
        let (path, url) = temp_db("storage-binding");
        let storage = SavedAccountsStorage::connect(&url).await.expect("connect");
        storage.init_schema().await.expect("schema");

        let hostile = r#"x"); DROP TABLE saved_accounts; --"#;
        storage
            .upsert(hostile, "\"quoted\" 'secret'", hostile)
            .await
            .expect("upsert");

        assert!(storage.exists(hostile).await.expect("exists"));
        assert!(!storage.exists("x").await.expect("exists"));
        let row = storage
            .get_by_device_id(hostile)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(row.username, hostile);
        assert_eq!(row.secret, "\"quoted\" 'secret'");

        storage.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn closed_pool_is_reopened() {
        let (path, url) = temp_db("storage-reopen");
        let mut storage = SavedAccountsStorage::connect(&url).await.expect("connect");
        storage.init_schema().await.expect("schema");
        storage.upsert("alex", "p@ss", "dev-1").await.expect("upsert");

        storage.pool().close().await;
        assert!(storage.exists("dev-1").await.is_err());

        storage.ensure_open().await.expect("reopen");
        assert!(storage.exists("dev-1").await.expect("exists after reopen"));

        storage.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
