use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::TokenStore;
use crate::token::asymmetric::{AsymmetricCipher, RsaCipher};
use crate::token::cipher::SymmetricCipher;
use crate::token::cleanup::{
    BoxedCleanupStrategy, CleanupStrategy, CustomCleanupStrategy, HybridCleanupStrategy,
};
use crate::token::hasher::{Argon2Hasher, SecretHasher};
use crate::token::id::IdGenerator;
use crate::token::time_utils::{TimeProviderFn, system_time_provider};
use crate::token::{TokenConfig, TokenError, TokenManager};

/// A builder for creating a `TokenManager` instance.
///
/// Every component defaults to what the [`TokenConfig`] describes: the
/// configured cipher, the configured store, RSA for hybrid tokens, Argon2id
/// for hash challenges, the system clock, and a [`HybridCleanupStrategy`]
/// that purges expired store entries every 100 writes or 5 minutes. Each can
/// be replaced.
#[must_use = "The builder does nothing unless `.build_and_init()` is called."]
pub struct TokenManagerBuilder {
    config: TokenConfig,
    storage: Option<Arc<dyn TokenStore>>,
    cipher: Option<Arc<dyn SymmetricCipher>>,
    asymmetric: Option<Arc<dyn AsymmetricCipher>>,
    hasher: Option<Arc<dyn SecretHasher>>,
    time_provider: Option<TimeProviderFn>,
    cleanup_strategy: Option<BoxedCleanupStrategy>,
}

impl TokenManagerBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: TokenConfig::default(),
            storage: None,
            cipher: None,
            asymmetric: None,
            hasher: None,
            time_provider: None,
            cleanup_strategy: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: TokenConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `storage` instead of connecting to `config.store`.
    pub fn with_storage(mut self, storage: Arc<dyn TokenStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Uses a custom symmetric cipher instead of `config.cipher`.
    ///
    /// The configured key must match the cipher's key size.
    pub fn with_cipher(mut self, cipher: Arc<dyn SymmetricCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Uses a custom key-wrapping cipher for hybrid tokens.
    ///
    /// If not set, defaults to RSA with PKCS#1 v1.5 padding.
    pub fn with_asymmetric(mut self, asymmetric: Arc<dyn AsymmetricCipher>) -> Self {
        self.asymmetric = Some(asymmetric);
        self
    }

    /// Uses a custom hasher for hash-challenge tokens.
    ///
    /// If not set, defaults to Argon2id with default parameters.
    pub fn with_hasher(mut self, hasher: Arc<dyn SecretHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Sets a custom time provider, in seconds since the Unix epoch.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicU64, Ordering};
    /// use token_auth::{TokenConfig, TokenManager};
    ///
    /// # async fn example() -> Result<(), token_auth::TokenError> {
    /// let clock = Arc::new(AtomicU64::new(1_700_000_000));
    /// let clock_clone = Arc::clone(&clock);
    ///
    /// let manager = TokenManager::builder()
    ///     .with_config(TokenConfig {
    ///         key: "0123456789abcdef0123456789abcdef".to_string(),
    ///         ..TokenConfig::default()
    ///     })
    ///     .with_time_provider(move || Ok(clock_clone.load(Ordering::SeqCst)))
    ///     .build_and_init()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_time_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Result<u64, TokenError> + Send + Sync + 'static,
    {
        self.time_provider = Some(Arc::new(provider));
        self
    }

    /// Uses `strategy` to decide when expired store entries are purged.
    pub fn with_cleanup_strategy(mut self, strategy: impl CleanupStrategy + 'static) -> Self {
        self.cleanup_strategy = Some(Box::new(strategy));
        self
    }

    /// Purges expired store entries every `count_threshold` writes or once
    /// `time_threshold` has passed since the last purge.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use token_auth::{TokenConfig, TokenManager};
    ///
    /// # async fn example() -> Result<(), token_auth::TokenError> {
    /// let manager = TokenManager::builder()
    ///     .with_config(TokenConfig {
    ///         key: "0123456789abcdef0123456789abcdef".to_string(),
    ///         ..TokenConfig::default()
    ///     })
    ///     .with_hybrid_cleanup_thresholds(1000, Duration::from_secs(60))
    ///     .build_and_init()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_hybrid_cleanup_thresholds(
        self,
        count_threshold: u32,
        time_threshold: Duration,
    ) -> Self {
        self.with_cleanup_strategy(HybridCleanupStrategy::new(count_threshold, time_threshold))
    }

    /// Decides when to purge with a closure returning `Future<Output = bool>`.
    pub fn with_custom_cleanup_strategy<F, Fut>(self, strategy_fn: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.with_cleanup_strategy(CustomCleanupStrategy::new(strategy_fn))
    }

    /// Builds and initializes the `TokenManager`.
    ///
    /// Checks the configuration, connects to (or initializes) the store and
    /// logs any soft configuration warnings.
    ///
    /// # Errors
    ///
    /// - [`TokenError::ConfigError`] if the instance id is out of range, the
    ///   key cannot be decoded or does not fit the cipher, or the configured
    ///   cipher or store is unavailable
    /// - [`TokenError::StorageError`] if the store cannot be initialized
    pub async fn build_and_init(self) -> Result<TokenManager, TokenError> {
        let config = self.config;

        let cipher = match self.cipher {
            Some(cipher) => cipher,
            None => config.cipher.build()?,
        };

        let key = config.decode_key()?;
        if key.len() != cipher.key_size() {
            return Err(TokenError::ConfigError(format!(
                "{} requires a {}-byte key, got {} bytes",
                cipher.name(),
                cipher.key_size(),
                key.len()
            )));
        }

        let storage = match self.storage {
            Some(storage) => {
                storage.init().await?;
                storage
            }
            None => config.store.connect().await?,
        };

        let ids = IdGenerator::new(config.instance_id, Arc::clone(&storage))?;

        for warning in config.soft_warnings() {
            tracing::warn!(%warning, "Token configuration warning");
        }
        tracing::debug!(config = %config.summary(), "Token manager initialized");

        Ok(TokenManager {
            config,
            key,
            storage,
            ids,
            cipher,
            asymmetric: self
                .asymmetric
                .unwrap_or_else(|| Arc::new(RsaCipher::default())),
            hasher: self
                .hasher
                .unwrap_or_else(|| Arc::new(Argon2Hasher::default())),
            time_provider: self
                .time_provider
                .unwrap_or_else(system_time_provider),
            cleanup_strategy: self
                .cleanup_strategy
                .unwrap_or_else(|| Box::new(HybridCleanupStrategy::default())),
        })
    }
}
