//! Pluggable key-value storage backends.
//!
//! The engine keeps no state of its own. Sequence counters for id
//! allocation, liveness records for strict validation and the hashes of
//! challenge tokens all live in a [`TokenStore`]. The available backends
//! depend on the enabled features.

use crate::TokenError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// Always available
mod memory;
pub use memory::MemoryStorage;

// Feature-gated storage backends
#[cfg(feature = "sqlite-storage")]
mod sqlite;
#[cfg(feature = "sqlite-storage")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "redis-storage")]
mod redis;
#[cfg(feature = "redis-storage")]
pub use redis::RedisStorage;

/// Key prefix used by the Redis backend when built from a [`StoreKind`].
pub const DEFAULT_KEY_PREFIX: &str = "token_auth";

/// Statistics about the storage backend.
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Total number of live records in storage
    pub total_records: usize,
    /// Additional backend-specific information
    pub backend_info: String,
}

/// Abstract key-value store with per-entry expiry.
///
/// # Available Implementations
///
/// - [`MemoryStorage`] - Always available, in-memory HashMap-based storage
/// - `SqliteStorage` - Available with `sqlite-storage` feature, persistent SQLite storage
/// - `RedisStorage` - Available with `redis-storage` feature, distributed Redis storage
///
/// # Thread Safety
///
/// All methods are async and must be thread-safe. [`TokenStore::increment`]
/// in particular must be a single atomic increment-and-return that is
/// visible to every engine instance sharing the store; otherwise two
/// concurrent allocations could observe the same counter value and
/// produce duplicate ids.
///
/// # Error Handling
///
/// Backend faults are reported as [`TokenError::StorageError`]. The engine
/// propagates them unchanged.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Optional method for storage backend initialization.
    ///
    /// Called once by the manager builder. Implementations can use this for
    /// schema creation, connection checks, etc.
    async fn init(&self) -> Result<(), TokenError> {
        Ok(())
    }

    /// Retrieves a value.
    ///
    /// Returns `Ok(None)` if the key is absent or its TTL has elapsed.
    async fn get(&self, key: &str) -> Result<Option<String>, TokenError>;

    /// Stores a value, replacing any previous one, for `ttl`.
    ///
    /// A zero TTL removes the key.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError>;

    /// Removes a key. Removing an absent key is not an error.
    async fn forget(&self, key: &str) -> Result<(), TokenError>;

    /// Atomically increments a counter and returns the new value.
    ///
    /// An absent counter starts at zero, so the first call returns 1.
    /// Counters never expire.
    async fn increment(&self, key: &str) -> Result<u64, TokenError>;

    /// Removes all expired entries and returns how many were removed.
    ///
    /// Backends with native expiry may return `Ok(0)`.
    async fn cleanup_expired(&self) -> Result<usize, TokenError>;

    /// Returns statistics about the storage backend.
    async fn get_stats(&self) -> Result<StorageStats, TokenError>;
}

/// Backing store selector used by [`TokenConfig`](crate::TokenConfig).
///
/// Parses from and displays as:
/// - `memory` (alias `array`)
/// - `sqlite:<path>` (`sqlite::memory:` for an in-memory database)
/// - a `redis://` or `rediss://` URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StoreKind {
    /// Process-local [`MemoryStorage`].
    #[default]
    Memory,
    /// SQLite database at the given path.
    Sqlite(String),
    /// Redis server at the given URL.
    Redis(String),
}

impl StoreKind {
    /// Creates and initializes the selected backend.
    pub async fn connect(&self) -> Result<Arc<dyn TokenStore>, TokenError> {
        let store: Arc<dyn TokenStore> = match self {
            Self::Memory => Arc::new(MemoryStorage::new()),
            #[cfg(feature = "sqlite-storage")]
            Self::Sqlite(path) => Arc::new(SqliteStorage::new(path)?),
            #[cfg(feature = "redis-storage")]
            Self::Redis(url) => Arc::new(RedisStorage::new(url, DEFAULT_KEY_PREFIX)?),
            #[allow(unreachable_patterns)]
            other => {
                return Err(TokenError::ConfigError(format!(
                    "Store '{other}' is not enabled in this build"
                )));
            }
        };
        store.init().await?;
        tracing::info!(store = %self, "Token store initialized");
        Ok(store)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Sqlite(path) => write!(f, "sqlite:{path}"),
            Self::Redis(url) => f.write_str(url),
        }
    }
}

impl FromStr for StoreKind {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("memory") || s.eq_ignore_ascii_case("array") {
            return Ok(Self::Memory);
        }
        if let Some(path) = s.strip_prefix("sqlite:") {
            if path.is_empty() {
                return Err(TokenError::ConfigError("Empty SQLite path".to_string()));
            }
            return Ok(Self::Sqlite(path.to_string()));
        }
        if s.starts_with("redis://") || s.starts_with("rediss://") {
            return Ok(Self::Redis(s.to_string()));
        }
        Err(TokenError::ConfigError(format!("Unknown store '{s}'")))
    }
}

impl TryFrom<String> for StoreKind {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StoreKind> for String {
    fn from(kind: StoreKind) -> Self {
        kind.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!("array".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!(
            "sqlite:/tmp/tokens.db".parse::<StoreKind>().unwrap(),
            StoreKind::Sqlite("/tmp/tokens.db".to_string())
        );
        assert_eq!(
            "redis://localhost:6379".parse::<StoreKind>().unwrap(),
            StoreKind::Redis("redis://localhost:6379".to_string())
        );
        assert!("sqlite:".parse::<StoreKind>().is_err());
        assert!("file".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_store_kind_display_round_trip() {
        for kind in [
            StoreKind::Memory,
            StoreKind::Sqlite(":memory:".to_string()),
            StoreKind::Redis("redis://127.0.0.1/0".to_string()),
        ] {
            assert_eq!(kind.to_string().parse::<StoreKind>().unwrap(), kind);
        }
    }

    #[tokio::test]
    async fn test_connect_memory() -> Result<(), TokenError> {
        let store = StoreKind::Memory.connect().await?;
        store.put("k", "v", Duration::from_secs(60)).await?;
        assert_eq!(store.get("k").await?.as_deref(), Some("v"));
        Ok(())
    }

    #[cfg(not(feature = "redis-storage"))]
    #[tokio::test]
    async fn test_connect_disabled_backend() {
        let result = StoreKind::Redis("redis://localhost".to_string()).connect().await;
        assert!(matches!(result, Err(TokenError::ConfigError(_))));
    }
}
