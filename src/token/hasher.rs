//! One-way hashing for hash-challenge tokens.
//!
//! Only the hash of `token + code` is ever written to the store, so a
//! leaked store does not reveal usable challenge secrets.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::TokenError;

/// A salted one-way hash function.
pub trait SecretHasher: Send + Sync {
    /// Returns the name/identifier of this hash function.
    fn name(&self) -> &'static str;

    /// Hashes `secret` into a self-describing string suitable for storage.
    fn make(&self, secret: &str) -> Result<String, TokenError>;

    /// Checks `secret` against a hash produced by [`SecretHasher::make`].
    ///
    /// Returns `false` for a mismatch and for an unparsable hash.
    fn check(&self, secret: &str, hash: &str) -> bool;
}

/// Argon2id hasher producing PHC strings.
///
/// # Example
///
/// ```rust
/// use token_auth::{Argon2Hasher, SecretHasher};
///
/// let hasher = Argon2Hasher::default();
/// let hash = hasher.make("token-and-code")?;
/// assert!(hash.starts_with("$argon2id$"));
/// assert!(hasher.check("token-and-code", &hash));
/// assert!(!hasher.check("something-else", &hash));
/// # Ok::<(), token_auth::TokenError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Creates a hasher with explicit cost parameters.
    ///
    /// # Arguments
    ///
    /// * `m_cost` - Memory size in KiB
    /// * `t_cost` - Number of iterations
    /// * `p_cost` - Degree of parallelism
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, TokenError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| TokenError::ConfigError(format!("Invalid Argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl SecretHasher for Argon2Hasher {
    fn name(&self) -> &'static str {
        "argon2id"
    }

    fn make(&self, secret: &str) -> Result<String, TokenError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| TokenError::CryptoError(format!("Hashing failed: {e}")))
    }

    fn check(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
