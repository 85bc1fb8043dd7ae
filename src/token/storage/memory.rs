//! In-memory storage backend implementation.
//!
//! This module provides a simple in-memory storage backend that uses a HashMap
//! guarded by a tokio `RwLock`. It's ideal for testing, development, and
//! single-instance applications where persistence across restarts is not required.

use super::{StorageStats, TokenStore};
use crate::TokenError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// A simple in-memory storage implementation for testing and single-instance applications.
///
/// Expired entries are invisible to reads immediately and are physically
/// removed by [`TokenStore::cleanup_expired`] or when overwritten.
///
/// Entry TTLs run on the real monotonic clock ([`Instant`]), not on the time
/// provider injected into the manager. Advancing a fake clock expires the
/// tokens it checks, but it does not expire store entries such as liveness
/// records or challenge hashes; tests that need those gone should use short
/// real TTLs or remove the keys.
///
/// # Example
///
/// ```rust
/// use token_auth::storage::{MemoryStorage, TokenStore};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), token_auth::TokenError> {
/// let storage = MemoryStorage::new();
///
/// storage.put("reset_42", "token", Duration::from_secs(300)).await?;
/// assert_eq!(storage.get("reset_42").await?.as_deref(), Some("token"));
///
/// assert_eq!(storage.increment("auto_id_1").await?, 1);
/// assert_eq!(storage.increment("auto_id_1").await?, 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryStorage {
    /// Creates a new in-memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage instance with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::with_capacity(capacity))),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, TokenError> {
        let now = Instant::now();
        let data = self.data.read().await;
        Ok(data
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError> {
        let mut data = self.data.write().await;
        if ttl.is_zero() {
            data.remove(key);
            return Ok(());
        }
        data.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), TokenError> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<u64, TokenError> {
        let now = Instant::now();
        let mut data = self.data.write().await;

        let current = match data.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => entry.value.parse::<u64>().map_err(|_| {
                TokenError::from_storage_message(format!("Value at '{key}' is not a counter"))
            })?,
            None => 0,
        };
        let next = current + 1;

        data.insert(
            key.to_string(),
            MemoryEntry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn cleanup_expired(&self) -> Result<usize, TokenError> {
        let now = Instant::now();
        let mut data = self.data.write().await;
        let initial_count = data.len();
        data.retain(|_, entry| entry.is_live(now));
        Ok(initial_count - data.len())
    }

    async fn get_stats(&self) -> Result<StorageStats, TokenError> {
        let now = Instant::now();
        let data = self.data.read().await;
        let live = data.values().filter(|entry| entry.is_live(now)).count();
        let memory_usage: usize = data
            .iter()
            .map(|(k, v)| k.len() + v.value.len() + std::mem::size_of::<MemoryEntry>())
            .sum();
        Ok(StorageStats {
            total_records: live,
            backend_info: format!("In-memory HashMap storage (~{memory_usage} bytes)"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_basic_operations() -> Result<(), TokenError> {
        let storage = MemoryStorage::new();

        storage.put("key", "value", Duration::from_secs(300)).await?;
        assert_eq!(storage.get("key").await?.as_deref(), Some("value"));

        // Overwrite replaces the value
        storage.put("key", "other", Duration::from_secs(300)).await?;
        assert_eq!(storage.get("key").await?.as_deref(), Some("other"));

        storage.forget("key").await?;
        assert_eq!(storage.get("key").await?, None);

        // Forgetting an absent key is fine
        storage.forget("key").await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_storage_zero_ttl_removes() -> Result<(), TokenError> {
        let storage = MemoryStorage::new();
        storage.put("key", "value", Duration::from_secs(300)).await?;
        storage.put("key", "value", Duration::ZERO).await?;
        assert_eq!(storage.get("key").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_storage_expiry() -> Result<(), TokenError> {
        let storage = MemoryStorage::new();
        storage.put("short", "v", Duration::from_millis(20)).await?;
        storage.put("long", "v", Duration::from_secs(300)).await?;

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(storage.get("short").await?, None);
        assert_eq!(storage.get("long").await?.as_deref(), Some("v"));

        let removed = storage.cleanup_expired().await?;
        assert_eq!(removed, 1);
        assert_eq!(storage.get_stats().await?.total_records, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_storage_increment() -> Result<(), TokenError> {
        let storage = MemoryStorage::new();
        assert_eq!(storage.increment("counter").await?, 1);
        assert_eq!(storage.increment("counter").await?, 2);
        assert_eq!(storage.increment("counter").await?, 3);

        // Forget resets the counter
        storage.forget("counter").await?;
        assert_eq!(storage.increment("counter").await?, 1);

        // Non-numeric values are rejected
        storage.put("text", "abc", Duration::from_secs(60)).await?;
        assert!(matches!(
            storage.increment("text").await,
            Err(TokenError::StorageError(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_storage_stats() -> Result<(), TokenError> {
        let storage = MemoryStorage::with_capacity(4);

        let stats = storage.get_stats().await?;
        assert_eq!(stats.total_records, 0);
        assert!(stats.backend_info.contains("In-memory"));

        storage.put("a", "1", Duration::from_secs(300)).await?;
        storage.increment("b").await?;

        let stats = storage.get_stats().await?;
        assert_eq!(stats.total_records, 2);
        assert!(stats.backend_info.contains("bytes"));

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_storage_concurrent_increment() -> Result<(), TokenError> {
        let storage = Arc::new(MemoryStorage::new());
        let mut handles = vec![];

        for _ in 0..50 {
            let storage_clone = Arc::clone(&storage);
            handles.push(tokio::spawn(
                async move { storage_clone.increment("shared").await },
            ));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap()?);
        }
        values.sort_unstable();

        // Every caller observed a distinct value
        assert_eq!(values, (1..=50).collect::<Vec<u64>>());

        Ok(())
    }
}
