use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::Sha256;

use super::asymmetric::AsymmetricCipher;
use super::cipher::SymmetricCipher;
use super::cleanup::BoxedCleanupStrategy;
use super::codec::{DELIMITER, Record, decode_url_safe, encode_url_safe};
use super::hasher::SecretHasher;
use super::id::IdGenerator;
use super::storage::TokenStore;
use super::time_utils::TimeProviderFn;
use super::value::{Payload, Token};
use super::{TokenConfig, TokenError, TokenManagerBuilder};

type HmacSha256 = Hmac<Sha256>;

/// Length of the random secret behind a hash-challenge token.
const CHALLENGE_SECRET_LEN: usize = 40;

/// Separator between the wrapped key and the ciphertext of a hybrid token.
const HYBRID_SEPARATOR: char = '.';

/// Plaintext record plus the metadata computed while building it.
struct Issued {
    id: u64,
    ttl: u64,
    expire_at: u64,
    record: String,
}

/// Issues and validates typed, expiring tokens.
///
/// The manager holds no mutable state of its own: counters, liveness records
/// and challenge hashes live in the [`TokenStore`]. It is `Send + Sync` and
/// can be shared across tasks behind an `Arc`.
///
/// After each write of a liveness record or challenge hash, the configured
/// [`CleanupStrategy`](super::cleanup::CleanupStrategy) may schedule a
/// background purge of expired store entries.
///
/// Three issuance paths are available, each with its validation counterpart:
///
/// | Issue        | Validate     | Token shape                                  |
/// |--------------|--------------|----------------------------------------------|
/// | [`create`]   | [`validate`] | URL-safe symmetric ciphertext                |
/// | [`encrypt`]  | [`decrypt`]  | `{wrapped key}.{symmetric ciphertext}`       |
/// | [`hash`]     | [`check`]    | HMAC hex string; only a hash is stored       |
///
/// To create an instance, use [`TokenManager::builder`].
///
/// [`create`]: TokenManager::create
/// [`validate`]: TokenManager::validate
/// [`encrypt`]: TokenManager::encrypt
/// [`decrypt`]: TokenManager::decrypt
/// [`hash`]: TokenManager::hash
/// [`check`]: TokenManager::check
///
/// # Example
///
/// ```rust
/// use token_auth::{TokenConfig, TokenManager};
///
/// # async fn example() -> Result<(), token_auth::TokenError> {
/// let config = TokenConfig {
///     key: "base64:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
///     ..TokenConfig::default()
/// };
/// let manager = TokenManager::builder().with_config(config).build_and_init().await?;
///
/// let issued = manager.create("reset", "user@example.com", 0).await?;
/// let checked = manager.validate("reset", issued.token(), false).await?;
/// assert_eq!(checked.payload().as_scalar(), Some("user@example.com"));
/// # Ok(())
/// # }
/// ```
pub struct TokenManager {
    pub(crate) config: TokenConfig,
    pub(crate) key: Vec<u8>,
    pub(crate) storage: Arc<dyn TokenStore>,
    pub(crate) ids: IdGenerator,
    pub(crate) cipher: Arc<dyn SymmetricCipher>,
    pub(crate) asymmetric: Arc<dyn AsymmetricCipher>,
    pub(crate) hasher: Arc<dyn SecretHasher>,
    pub(crate) time_provider: TimeProviderFn,
    pub(crate) cleanup_strategy: BoxedCleanupStrategy,
}

impl TokenManager {
    /// Creates a new builder.
    pub fn builder() -> TokenManagerBuilder {
        TokenManagerBuilder::new()
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// The backing store.
    pub fn storage(&self) -> &Arc<dyn TokenStore> {
        &self.storage
    }

    /// Current time according to the configured time provider.
    pub fn now(&self) -> Result<u64, TokenError> {
        (self.time_provider)()
    }

    /// Store key of the liveness record for a symmetric token.
    pub fn liveness_key(token_type: &str, id: u64) -> String {
        format!("{token_type}_{id}")
    }

    /// Issues a symmetric token.
    ///
    /// The payload, a freshly allocated id, the type and the expiry are
    /// joined into a record, encrypted with the configured cipher and key,
    /// and URL-safe encoded. Unless disabled in the config, the token is also
    /// recorded under `{type}_{id}` for strict validation.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InvalidPayload`] if the type or a payload field contains `|`
    /// - [`TokenError::ConfigError`] if the type's TTL pushes the expiry past `u64::MAX`
    /// - Storage and crypto faults are propagated
    pub async fn create(
        &self,
        token_type: &str,
        payload: impl Into<Payload>,
        owner: u64,
    ) -> Result<Token, TokenError> {
        let payload = payload.into();
        let issued = self.issue(token_type, &payload).await?;

        let encrypted = self.cipher.encrypt_string(&issued.record, &self.key)?;
        let token = encode_url_safe(&encrypted);

        if self.config.record_tokens {
            self.storage
                .put(
                    &Self::liveness_key(token_type, issued.id),
                    &token,
                    Duration::from_secs(issued.ttl),
                )
                .await?;
        }

        tracing::debug!(token_type, id = issued.id, ttl = issued.ttl, "Token created");

        if self.config.record_tokens {
            self.maybe_trigger_cleanup().await;
        }

        Ok(Token::new(
            issued.id,
            token_type,
            owner,
            issued.ttl,
            issued.expire_at,
            token,
            payload,
        ))
    }

    /// Validates a symmetric token issued by [`TokenManager::create`].
    ///
    /// With `strict`, the `{type}_{id}` record must still exist in the store
    /// and hold exactly this token, so [`TokenManager::remove`] revokes it.
    ///
    /// The returned token carries the remaining TTL and `owner = 0`.
    ///
    /// # Errors
    ///
    /// - [`TokenError::NotFound`] for undecryptable or malformed input, a type
    ///   mismatch, or (strict) a missing or different store record
    /// - [`TokenError::Expired`] once the embedded expiry has passed
    pub async fn validate(
        &self,
        token_type: &str,
        token: &str,
        strict: bool,
    ) -> Result<Token, TokenError> {
        let now = self.now()?;

        let plaintext = self
            .cipher
            .decrypt_string(&decode_url_safe(token), &self.key)
            .inspect_err(|e| tracing::warn!(token_type, error = %e, "Token decryption failed"))?;
        let record = Record::parse(&plaintext)?;
        let ttl = Self::check_record(token_type, &record, now)?;

        if strict {
            let stored = self
                .storage
                .get(&Self::liveness_key(token_type, record.id))
                .await?;
            if stored.as_deref() != Some(token) {
                return Err(TokenError::not_found());
            }
        }

        tracing::debug!(token_type, id = record.id, ttl, "Token validated");

        Ok(Token::new(
            record.id,
            token_type,
            0,
            ttl,
            record.expire_at,
            token,
            record.into_payload(),
        ))
    }

    /// Issues a hybrid token for the holder of `public_key_pem`.
    ///
    /// The record is encrypted with a one-time symmetric key; only that key
    /// is encrypted with the public key. The token is
    /// `{wrapped key}.{ciphertext}`, both parts URL-safe encoded. Nothing is
    /// written to the store apart from the id counter.
    pub async fn encrypt(
        &self,
        token_type: &str,
        payload: impl Into<Payload>,
        public_key_pem: &str,
        owner: u64,
    ) -> Result<Token, TokenError> {
        let payload = payload.into();
        let issued = self.issue(token_type, &payload).await?;

        let one_time_key = self.cipher.generate_key();
        let key_token = encode_url_safe(&self.cipher.encrypt_string(&issued.record, &one_time_key)?);

        let wrapped = self.asymmetric.public_encrypt(&one_time_key, public_key_pem)?;
        let crypt_text = encode_url_safe(&BASE64.encode(wrapped));

        tracing::debug!(token_type, id = issued.id, ttl = issued.ttl, "Hybrid token created");

        Ok(Token::new(
            issued.id,
            token_type,
            owner,
            issued.ttl,
            issued.expire_at,
            format!("{crypt_text}{HYBRID_SEPARATOR}{key_token}"),
            payload,
        ))
    }

    /// Decrypts a hybrid token issued by [`TokenManager::encrypt`].
    ///
    /// # Errors
    ///
    /// - [`TokenError::NotFound`] if the token does not have exactly two
    ///   parts, the key cannot be unwrapped with `private_key_pem`, the
    ///   ciphertext does not decrypt, or the type does not match
    /// - [`TokenError::Expired`] once the embedded expiry has passed
    pub async fn decrypt(
        &self,
        token_type: &str,
        token: &str,
        private_key_pem: &str,
    ) -> Result<Token, TokenError> {
        let now = self.now()?;

        let mut parts = token.split(HYBRID_SEPARATOR);
        let (Some(crypt_text), Some(key_token), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::not_found());
        };

        let wrapped = BASE64
            .decode(decode_url_safe(crypt_text))
            .map_err(|e| TokenError::malformed(format!("invalid key encoding: {e}")))?;
        let one_time_key = self
            .asymmetric
            .private_decrypt(&wrapped, private_key_pem)
            .inspect_err(|e| tracing::warn!(token_type, error = %e, "Token key unwrap failed"))?;

        let plaintext = self
            .cipher
            .decrypt_string(&decode_url_safe(key_token), &one_time_key)
            .inspect_err(|e| tracing::warn!(token_type, error = %e, "Token decryption failed"))?;
        let record = Record::parse(&plaintext)?;
        let ttl = Self::check_record(token_type, &record, now)?;

        tracing::debug!(token_type, id = record.id, ttl, "Hybrid token decrypted");

        Ok(Token::new(
            record.id,
            token_type,
            0,
            ttl,
            record.expire_at,
            token,
            record.into_payload(),
        ))
    }

    /// Issues a hash-challenge token.
    ///
    /// A random secret is signed with HMAC-SHA256 keyed by `hash_key`; the
    /// hex digest is the token. Only a one-way hash of `token + code` is stored, under
    /// `{type}_{key}` with the type's TTL; expiry is left to the store.
    ///
    /// The returned token has `id = now` and `payload = key`.
    ///
    /// # Errors
    ///
    /// - [`TokenError::ConfigError`] if the type's TTL pushes the expiry past `u64::MAX`
    /// - Storage and crypto faults are propagated
    pub async fn hash(
        &self,
        token_type: &str,
        key: &str,
        code: &str,
        user_id: u64,
    ) -> Result<Token, TokenError> {
        let now = self.now()?;
        let ttl = self.config.ttl_for(token_type);
        let expire_at = Self::expiry(token_type, now, ttl)?;

        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CHALLENGE_SECRET_LEN)
            .map(char::from)
            .collect();

        let mut mac = HmacSha256::new_from_slice(self.config.hash_key.as_bytes())
            .map_err(|e| TokenError::CryptoError(format!("Invalid HMAC key: {e}")))?;
        mac.update(secret.as_bytes());
        let token = hex::encode(mac.finalize().into_bytes());

        let hash = self.hasher.make(&format!("{token}{code}"))?;
        self.storage
            .put(&format!("{token_type}_{key}"), &hash, Duration::from_secs(ttl))
            .await?;

        tracing::debug!(token_type, ttl, "Hash challenge created");

        self.maybe_trigger_cleanup().await;

        Ok(Token::new(
            now,
            token_type,
            user_id,
            ttl,
            expire_at,
            token,
            Payload::from(key),
        ))
    }

    /// Verifies `presented` against the hash stored under `key`.
    ///
    /// `key` is the full store key (`{type}_{key}` as written by
    /// [`TokenManager::hash`]) and `presented` is the challenge token
    /// followed by the code. See [`TokenManager::check_code`] for the
    /// convenience form.
    ///
    /// # Errors
    ///
    /// - [`TokenError::NotFound`] if nothing is stored (never issued, expired
    ///   or removed) or the hash does not match
    pub async fn check(&self, key: &str, presented: &str) -> Result<bool, TokenError> {
        let Some(hash) = self.storage.get(key).await? else {
            return Err(TokenError::not_found());
        };

        if !self.hasher.check(presented, &hash) {
            tracing::warn!(key, "Hash challenge mismatch");
            return Err(TokenError::NotFound("Token invalid".to_string()));
        }

        Ok(true)
    }

    /// Verifies a hash challenge from its parts.
    ///
    /// Equivalent to `check("{type}_{key}", "{token}{code}")`.
    pub async fn check_code(
        &self,
        token_type: &str,
        key: &str,
        token: &str,
        code: &str,
    ) -> Result<bool, TokenError> {
        self.check(&format!("{token_type}_{key}"), &format!("{token}{code}"))
            .await
    }

    /// Removes a store entry, e.g. `{type}_{id}` to revoke a token for strict
    /// validation or `{type}_{key}` to cancel a hash challenge.
    pub async fn remove(&self, key: &str) -> Result<(), TokenError> {
        self.storage.forget(key).await
    }

    /// Purges expired entries from the store now and returns how many were
    /// removed.
    pub async fn cleanup_expired(&self) -> Result<usize, TokenError> {
        self.storage.cleanup_expired().await
    }

    /// Checks the cleanup strategy and spawns a background purge if needed.
    async fn maybe_trigger_cleanup(&self) {
        if self.cleanup_strategy.should_cleanup().await {
            self.spawn_background_cleanup();
            self.cleanup_strategy.mark_as_cleaned().await;
        }
    }

    fn spawn_background_cleanup(&self) {
        let storage = Arc::clone(&self.storage);
        tokio::spawn(async move {
            match storage.cleanup_expired().await {
                Ok(removed) => tracing::debug!(removed, "Background cleanup finished"),
                Err(e) => tracing::warn!(error = %e, "Background cleanup failed"),
            }
        });
    }

    /// Allocates an id and builds the plaintext record.
    async fn issue(&self, token_type: &str, payload: &Payload) -> Result<Issued, TokenError> {
        if token_type.contains(DELIMITER) {
            return Err(TokenError::InvalidPayload(format!(
                "type {token_type:?} contains the '{DELIMITER}' delimiter"
            )));
        }
        payload.ensure_encodable(DELIMITER)?;

        let now = self.now()?;
        let ttl = self.config.ttl_for(token_type);
        let expire_at = Self::expiry(token_type, now, ttl)?;
        let id = self.ids.allocate(now).await?;

        Ok(Issued {
            id,
            ttl,
            expire_at,
            record: Record::format(payload, id, token_type, expire_at),
        })
    }

    /// Absolute expiry for a token issued at `now`.
    fn expiry(token_type: &str, now: u64, ttl: u64) -> Result<u64, TokenError> {
        now.checked_add(ttl).ok_or_else(|| {
            TokenError::ConfigError(format!(
                "TTL of {ttl}s for type '{token_type}' overflows the expiry timestamp"
            ))
        })
    }

    /// Checks type and expiry of a decoded record and returns the remaining TTL.
    fn check_record(token_type: &str, record: &Record, now: u64) -> Result<u64, TokenError> {
        if record.token_type != token_type {
            return Err(TokenError::type_mismatch());
        }
        match record.expire_at.checked_sub(now) {
            Some(ttl) if ttl > 0 => Ok(ttl),
            _ => Err(TokenError::Expired),
        }
    }
}
