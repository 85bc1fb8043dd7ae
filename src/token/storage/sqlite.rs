//! SQLite storage backend implementation.
//!
//! This module provides a persistent key-value table in SQLite. It's ideal
//! for single-instance applications whose counters and liveness records
//! must survive restarts.

use super::{StorageStats, TokenStore};
use crate::TokenError;
use crate::token::time_utils::current_timestamp;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// SQLite-based storage backend.
///
/// Entries live in a single `token_store` table. Expiry is stored as an
/// absolute Unix timestamp (`NULL` for counters) and checked on every read.
///
/// # Example
///
/// ```rust
/// use token_auth::storage::SqliteStorage;
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), token_auth::TokenError> {
/// // File-based storage
/// let storage = Arc::new(SqliteStorage::new("tokens.db")?);
///
/// // Or in-memory SQLite (for testing)
/// let memory_storage = Arc::new(SqliteStorage::new(":memory:")?);
/// # Ok(())
/// # }
/// ```
pub struct SqliteStorage {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage backend.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file, or ":memory:" for in-memory database
    pub fn new(db_path: &str) -> Result<Self, TokenError> {
        let connection = if db_path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(db_path)
        }?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TokenError> {
        self.connection
            .lock()
            .map_err(|_| TokenError::from_storage_message("SQLite connection lock poisoned"))
    }

    /// Create the database schema if it doesn't exist.
    fn init_schema(&self) -> Result<(), TokenError> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS token_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                expires_at INTEGER
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_token_store_expires_at ON token_store (expires_at)",
            [],
        )?;

        Ok(())
    }
}

#[async_trait]
impl TokenStore for SqliteStorage {
    async fn init(&self) -> Result<(), TokenError> {
        self.init_schema()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TokenError> {
        let now = current_timestamp()? as i64;
        let conn = self.lock()?;

        let value = conn
            .query_row(
                "SELECT value FROM token_store
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError> {
        if ttl.is_zero() {
            return self.forget(key).await;
        }
        // An oversized TTL saturates to i64::MAX and never expires
        let expires_at = i64::try_from(current_timestamp()?.saturating_add(ttl.as_secs().max(1)))
            .unwrap_or(i64::MAX);
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO token_store (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;

        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), TokenError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM token_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<u64, TokenError> {
        let now = current_timestamp()? as i64;
        let conn = self.lock()?;

        // Single upsert so concurrent writers sharing the file never read the same value
        let value: i64 = conn.query_row(
            "INSERT INTO token_store (key, value, expires_at) VALUES (?1, '1', NULL)
             ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN token_store.expires_at IS NOT NULL AND token_store.expires_at <= ?2 THEN '1'
                    ELSE CAST(CAST(token_store.value AS INTEGER) + 1 AS TEXT)
                END,
                expires_at = NULL
             RETURNING CAST(value AS INTEGER)",
            params![key, now],
            |row| row.get(0),
        )?;

        u64::try_from(value)
            .map_err(|_| TokenError::from_storage_message(format!("Counter '{key}' is negative")))
    }

    async fn cleanup_expired(&self) -> Result<usize, TokenError> {
        let now = current_timestamp()? as i64;
        let conn = self.lock()?;

        let changes = conn.execute(
            "DELETE FROM token_store WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
        )?;

        Ok(changes)
    }

    async fn get_stats(&self) -> Result<StorageStats, TokenError> {
        let now = current_timestamp()? as i64;
        let conn = self.lock()?;

        let count: usize = conn.query_row(
            "SELECT COUNT(*) FROM token_store WHERE expires_at IS NULL OR expires_at > ?1",
            params![now],
            |row| row.get(0),
        )?;

        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);

        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(StorageStats {
            total_records: count,
            backend_info: format!(
                "SQLite storage ({} bytes, {} pages)",
                page_count * page_size,
                page_count
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_storage() -> Result<SqliteStorage, TokenError> {
        let storage = SqliteStorage::new(":memory:")?;
        storage.init().await?;
        Ok(storage)
    }

    #[tokio::test]
    async fn test_sqlite_storage_basic_operations() -> Result<(), TokenError> {
        let storage = memory_storage().await?;

        storage.put("key", "value", Duration::from_secs(300)).await?;
        assert_eq!(storage.get("key").await?.as_deref(), Some("value"));

        storage.put("key", "other", Duration::from_secs(300)).await?;
        assert_eq!(storage.get("key").await?.as_deref(), Some("other"));

        storage.forget("key").await?;
        assert_eq!(storage.get("key").await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_storage_huge_ttl() -> Result<(), TokenError> {
        let storage = memory_storage().await?;

        storage.put("key", "value", Duration::from_secs(u64::MAX)).await?;
        assert_eq!(storage.get("key").await?.as_deref(), Some("value"));
        assert_eq!(storage.cleanup_expired().await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_storage_increment() -> Result<(), TokenError> {
        let storage = memory_storage().await?;

        assert_eq!(storage.increment("auto_id_3").await?, 1);
        assert_eq!(storage.increment("auto_id_3").await?, 2);

        storage.forget("auto_id_3").await?;
        assert_eq!(storage.increment("auto_id_3").await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_storage_cleanup() -> Result<(), TokenError> {
        let storage = memory_storage().await?;

        storage.put("live", "v", Duration::from_secs(300)).await?;
        storage.increment("counter").await?;

        // Force an expired row
        {
            let conn = storage.lock()?;
            conn.execute(
                "INSERT INTO token_store (key, value, expires_at) VALUES ('dead', 'v', 1)",
                [],
            )?;
        }

        assert_eq!(storage.get("dead").await?, None);
        assert_eq!(storage.cleanup_expired().await?, 1);
        assert_eq!(storage.get_stats().await?.total_records, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_storage_stats() -> Result<(), TokenError> {
        let storage = memory_storage().await?;

        let stats = storage.get_stats().await?;
        assert_eq!(stats.total_records, 0);
        assert!(stats.backend_info.contains("SQLite"));

        storage.put("a", "1", Duration::from_secs(300)).await?;
        let stats = storage.get_stats().await?;
        assert_eq!(stats.total_records, 1);
        assert!(stats.backend_info.contains("bytes"));

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_storage_persistence() -> Result<(), TokenError> {
        let temp_path = std::env::temp_dir().join(format!("token_auth_{}.db", std::process::id()));
        let temp_path = temp_path.to_string_lossy().to_string();

        {
            let storage = SqliteStorage::new(&temp_path)?;
            storage.init().await?;
            storage.put("persistent", "v", Duration::from_secs(300)).await?;
            storage.increment("counter").await?;
        }

        {
            let storage = SqliteStorage::new(&temp_path)?;
            storage.init().await?;
            assert_eq!(storage.get("persistent").await?.as_deref(), Some("v"));
            assert_eq!(storage.increment("counter").await?, 2);
        }

        std::fs::remove_file(&temp_path).ok();

        Ok(())
    }
}
