//! Redis storage backend implementation.
//!
//! This module provides a Redis-based storage backend. It's the natural
//! choice for multi-instance deployments: `INCR` gives every instance a
//! shared atomic sequence counter and `SET EX` gives native expiry.

use super::{StorageStats, TokenStore};
use crate::TokenError;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Redis-based storage backend.
///
/// # Example
///
/// ```rust
/// use token_auth::storage::RedisStorage;
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), token_auth::TokenError> {
/// let storage = Arc::new(RedisStorage::new("redis://localhost:6379", "token_auth")?);
/// # Ok(())
/// # }
/// ```
pub struct RedisStorage {
    client: Client,
    key_prefix: String,
    /// Shared persistent connection
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisStorage {
    /// Create a new Redis storage backend.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `key_prefix` - Prefix for all keys to avoid collisions
    pub fn new(redis_url: &str, key_prefix: &str) -> Result<Self, TokenError> {
        let client = Client::open(redis_url)
            .map_err(|e| TokenError::from_storage_message(format!("Redis client error: {e}")))?;

        Ok(Self {
            client,
            key_prefix: key_prefix.to_string(),
            conn: Arc::new(Mutex::new(None)),
        })
    }

    /// Get or create a persistent connection
    async fn get_connection(&self) -> Result<MultiplexedConnection, TokenError> {
        let mut conn_guard = self.conn.lock().await;

        if let Some(conn) = conn_guard.as_ref() {
            let mut test_conn = conn.clone();
            match redis::cmd("PING")
                .query_async::<_, String>(&mut test_conn)
                .await
            {
                Ok(_) => return Ok(conn.clone()),
                Err(_) => {
                    // Connection is dead, remove it
                    *conn_guard = None;
                }
            }
        }

        let new_conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| {
                TokenError::from_storage_message(format!("Redis connection failed: {e}"))
            })?;

        *conn_guard = Some(new_conn.clone());
        Ok(new_conn)
    }

    fn make_key(&self, key: &str) -> String {
        let mut full = String::with_capacity(self.key_prefix.len() + key.len() + 1);
        full.push_str(&self.key_prefix);
        full.push(':');
        full.push_str(key);
        full
    }

    /// Scan keys with pattern using SCAN instead of KEYS for production safety
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, TokenError> {
        let mut conn = self.get_connection().await?;
        let mut keys = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (new_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            cursor = new_cursor;

            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl TokenStore for RedisStorage {
    async fn init(&self) -> Result<(), TokenError> {
        let mut conn = self.get_connection().await?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TokenError::from_storage_message(format!("Redis ping failed: {e}")))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TokenError> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(self.make_key(key)).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError> {
        if ttl.is_zero() {
            return self.forget(key).await;
        }
        let mut conn = self.get_connection().await?;
        // Redis requires TTL in seconds, minimum 1 second
        let ttl_secs = ttl.as_secs().max(1) as usize;
        let _: () = conn
            .set_options(
                self.make_key(key),
                value,
                redis::SetOptions::default().with_expiration(redis::SetExpiry::EX(ttl_secs)),
            )
            .await?;
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), TokenError> {
        let mut conn = self.get_connection().await?;
        let _: usize = conn.del(self.make_key(key)).await?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<u64, TokenError> {
        let mut conn = self.get_connection().await?;
        let value: u64 = conn.incr(self.make_key(key), 1u64).await?;
        Ok(value)
    }

    async fn cleanup_expired(&self) -> Result<usize, TokenError> {
        // Redis evicts expired keys natively
        Ok(0)
    }

    async fn get_stats(&self) -> Result<StorageStats, TokenError> {
        let mut conn = self.get_connection().await?;

        let pattern = format!("{}:*", self.key_prefix);
        let total_records = self.scan_keys(&pattern).await?.len();

        let info: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;

        let memory_usage = info
            .lines()
            .find_map(|line| line.strip_prefix("used_memory_human:"))
            .map(str::trim)
            .unwrap_or("unknown");

        Ok(StorageStats {
            total_records,
            backend_info: format!(
                "Redis storage (memory: {memory_usage}, prefix: {}, persistent conn)",
                self.key_prefix
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // Skip them if Redis is not available
    async fn get_test_storage() -> Option<RedisStorage> {
        let storage = RedisStorage::new("redis://localhost:6379", "test_token_auth").ok()?;
        match storage.init().await {
            Ok(()) => Some(storage),
            Err(_) => {
                println!("Skipping Redis tests - no Redis server available");
                None
            }
        }
    }

    #[test]
    fn test_redis_key_prefix() {
        let storage = RedisStorage::new("redis://localhost:6379", "prefix").unwrap();
        assert_eq!(storage.make_key("reset_1"), "prefix:reset_1");
    }

    #[tokio::test]
    async fn test_redis_storage_basic_operations() {
        let Some(storage) = get_test_storage().await else {
            return;
        };

        storage
            .put("basic", "value", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(storage.get("basic").await.unwrap().as_deref(), Some("value"));

        storage.forget("basic").await.unwrap();
        assert_eq!(storage.get("basic").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_redis_storage_increment() {
        let Some(storage) = get_test_storage().await else {
            return;
        };

        storage.forget("counter").await.unwrap();
        assert_eq!(storage.increment("counter").await.unwrap(), 1);
        assert_eq!(storage.increment("counter").await.unwrap(), 2);
        storage.forget("counter").await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_storage_ttl() {
        let Some(storage) = get_test_storage().await else {
            return;
        };

        storage
            .put("short", "value", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(storage.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        // Should be automatically expired by Redis
        assert_eq!(storage.get("short").await.unwrap(), None);
    }
}
