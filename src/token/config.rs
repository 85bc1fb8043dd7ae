use std::collections::HashMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::token::cipher::CipherKind;
use crate::token::error::TokenError;
use crate::token::id::MAX_INSTANCE_ID;
use crate::token::storage::StoreKind;

/// Built-in TTL used when neither the type nor the global config sets one.
pub const DEFAULT_TTL: u64 = 900;

/// Predefined configuration presets for common use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// Production-ready configuration.
    ///
    /// - TTL: 15 minutes
    /// - Cipher: AES-256-CBC
    Production,

    /// Development-friendly configuration.
    ///
    /// - TTL: 1 hour (longer window for manual testing)
    /// - Cipher: AES-256-CBC
    Development,

    /// Load configuration from environment variables.
    ///
    /// See [`TokenConfig::from_env`]. If a variable cannot be parsed, the
    /// error is logged as a warning and the defaults are used.
    FromEnv,
}

/// Per-type overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConfig {
    /// TTL in seconds for tokens of this type.
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Configuration for the token engine.
///
/// The configuration is passed explicitly to
/// [`TokenManagerBuilder::with_config`](crate::TokenManagerBuilder::with_config).
///
/// # Environment Variables
///
/// [`TokenConfig::from_env`] reads:
/// - `TOKEN_TTL`: default TTL in seconds (default: 900)
/// - `TOKEN_HASH_KEY`: HMAC key material for hash challenges
/// - `TOKEN_KEY`: symmetric key, raw or `base64:`-prefixed
/// - `TOKEN_CIPHER`: `AES-128-CBC`, `AES-256-CBC` or `AES-256-GCM`
/// - `TOKEN_STORE`: `memory`, `sqlite:<path>` or a `redis://` URL
/// - `TOKEN_INSTANCE_ID`: 0..=4095
///
/// # Example
///
/// ```rust
/// use token_auth::TokenConfig;
///
/// let config = TokenConfig::from_json(r#"{
///     "ttl": 600,
///     "key": "base64:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
///     "types": { "reset": { "ttl": 60 } }
/// }"#)?;
///
/// assert_eq!(config.ttl_for("reset"), 60);
/// assert_eq!(config.ttl_for("verify"), 600);
/// # Ok::<(), token_auth::TokenError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Global default TTL in seconds.
    pub ttl: u64,
    /// HMAC key used to derive hash-challenge tokens.
    pub hash_key: String,
    /// Symmetric key for the token codec.
    pub key: String,
    /// Symmetric cipher.
    pub cipher: CipherKind,
    /// Backing store selector.
    pub store: StoreKind,
    /// Shard/process id embedded in generated ids.
    pub instance_id: u16,
    /// Per-type overrides keyed by token type.
    pub types: HashMap<String, TypeConfig>,
    /// Whether `create` writes the `{type}_{id}` liveness record used by
    /// strict validation.
    pub record_tokens: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            hash_key: String::new(),
            key: String::new(),
            cipher: CipherKind::default(),
            store: StoreKind::default(),
            instance_id: 0,
            types: HashMap::new(),
            record_tokens: true,
        }
    }
}

impl TokenConfig {
    /// Reads the configuration from environment variables.
    ///
    /// Unset variables keep their defaults; unparsable values are an error.
    pub fn from_env() -> Result<Self, TokenError> {
        let mut config = Self::default();

        if let Some(ttl) = env_var("TOKEN_TTL") {
            config.ttl = ttl
                .parse()
                .map_err(|e| TokenError::ConfigError(format!("TOKEN_TTL: {e}")))?;
        }
        if let Some(hash_key) = env_var("TOKEN_HASH_KEY") {
            config.hash_key = hash_key;
        }
        if let Some(key) = env_var("TOKEN_KEY") {
            config.key = key;
        }
        if let Some(cipher) = env_var("TOKEN_CIPHER") {
            config.cipher = cipher.parse()?;
        }
        if let Some(store) = env_var("TOKEN_STORE") {
            config.store = store.parse()?;
        }
        if let Some(instance_id) = env_var("TOKEN_INSTANCE_ID") {
            config.instance_id = instance_id
                .parse()
                .map_err(|e| TokenError::ConfigError(format!("TOKEN_INSTANCE_ID: {e}")))?;
        }

        Ok(config)
    }

    /// Parses a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, TokenError> {
        serde_json::from_str(json).map_err(|e| TokenError::ConfigError(e.to_string()))
    }

    /// Sets a TTL override for one token type.
    pub fn with_type_ttl(mut self, token_type: impl Into<String>, ttl: u64) -> Self {
        self.types.insert(token_type.into(), TypeConfig { ttl: Some(ttl) });
        self
    }

    /// Resolves the TTL for a token type.
    ///
    /// Type override first, then the global TTL, then [`DEFAULT_TTL`] when the
    /// global TTL is zero.
    pub fn ttl_for(&self, token_type: &str) -> u64 {
        self.types
            .get(token_type)
            .and_then(|t| t.ttl)
            .or(Some(self.ttl).filter(|ttl| *ttl > 0))
            .unwrap_or(DEFAULT_TTL)
    }

    /// Decodes the symmetric key.
    ///
    /// Keys prefixed with `base64:` are decoded, anything else is used as raw bytes.
    pub fn decode_key(&self) -> Result<Vec<u8>, TokenError> {
        match self.key.strip_prefix("base64:") {
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| TokenError::ConfigError(format!("Invalid base64 key: {e}"))),
            None => Ok(self.key.as_bytes().to_vec()),
        }
    }

    /// Checks hard constraints that make the configuration unusable.
    pub(crate) fn check(&self) -> Result<(), TokenError> {
        if self.instance_id > MAX_INSTANCE_ID {
            return Err(TokenError::ConfigError(format!(
                "instance_id {} exceeds {MAX_INSTANCE_ID}",
                self.instance_id
            )));
        }
        let key = self.decode_key()?;
        if key.len() != self.cipher.key_size() {
            return Err(TokenError::ConfigError(format!(
                "{} requires a {}-byte key, got {} bytes",
                self.cipher,
                self.cipher.key_size(),
                key.len()
            )));
        }
        Ok(())
    }

    /// Validates the configuration and returns any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Err(e) = self.check() {
            warnings.push(e.to_string());
        }
        warnings.extend(self.soft_warnings());
        warnings
    }

    /// Warnings for settings that work but are probably unintended.
    pub(crate) fn soft_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.hash_key.is_empty() {
            warnings.push("Empty hash_key makes hash challenge tokens predictable".to_string());
        }
        for (token_type, ttl) in self
            .types
            .iter()
            .filter_map(|(name, t)| t.ttl.map(|ttl| (name, ttl)))
        {
            if ttl == 0 {
                warnings.push(format!("Type '{token_type}' has a zero TTL"));
            }
        }
        if self.ttl > 86_400 {
            warnings.push("Long default TTL (> 1 day) increases exposure of leaked tokens".to_string());
        }

        warnings
    }

    /// Returns a summary of the current configuration.
    pub fn summary(&self) -> String {
        format!(
            "TokenConfig {{ TTL: {}s, Cipher: {}, Store: {}, Instance: {}, Type overrides: {} }}",
            self.ttl,
            self.cipher,
            self.store,
            self.instance_id,
            self.types.len()
        )
    }
}

impl From<ConfigPreset> for TokenConfig {
    fn from(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Production => Self::default(),
            ConfigPreset::Development => Self {
                ttl: 3600,
                ..Self::default()
            },
            ConfigPreset::FromEnv => Self::from_env().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid token environment, falling back to defaults");
                Self::default()
            }),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
