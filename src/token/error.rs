use thiserror::Error;

/// Error types that can occur while issuing or validating tokens.
///
/// Validation failures collapse into two reportable kinds, [`TokenError::NotFound`]
/// and [`TokenError::Expired`]. Everything else is a fault raised by an external
/// collaborator (store, cipher, configuration) and is fatal for the call.
///
/// # Error Categories
///
/// - **Validation Errors**: `NotFound`, `Expired`
/// - **Issuance Errors**: `InvalidPayload`
/// - **System Errors**: `StorageError`, `CryptoError`, `ConfigError`
///
/// # Example
///
/// ```rust
/// use token_auth::{TokenError, TokenManager};
///
/// # async fn example(manager: TokenManager, presented: &str) {
/// match manager.validate("reset", presented, false).await {
///     Ok(token) => println!("valid for {}s", token.ttl()),
///     Err(TokenError::NotFound(reason)) => println!("rejected: {reason}"),
///     Err(TokenError::Expired) => println!("expired, issue a new one"),
///     Err(e) => println!("system error: {e}"),
/// }
/// # }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token does not exist or cannot be accepted.
    ///
    /// # When This Occurs
    ///
    /// - The token was issued for a different type
    /// - Strict validation found no liveness record in the store
    /// - A hash challenge has no stored hash or the presented secret is wrong
    /// - The token is malformed, tampered with, or was encrypted under a
    ///   different key (a garbage token is indistinguishable from one that
    ///   never existed)
    ///
    /// The string carries a human-readable reason.
    #[error("{0}")]
    NotFound(String),

    /// The embedded expiry has passed.
    ///
    /// The caller must issue a new token; TTLs are never extended.
    #[error("Token expired")]
    Expired,

    /// A payload field or the type tag contains the record delimiter.
    ///
    /// Records are joined with `|` without escaping, so such input could
    /// never be decoded back into the same fields.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A storage backend operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A cryptographic primitive failed during issuance.
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// The configuration is invalid.
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl TokenError {
    /// Generic "not found" rejection.
    pub(crate) fn not_found() -> Self {
        Self::NotFound("Token not found".to_string())
    }

    /// Rejection for a token whose type tag does not match.
    pub(crate) fn type_mismatch() -> Self {
        Self::NotFound("Token type invalid".to_string())
    }

    /// Rejection for a token that fails decoding or decryption.
    pub(crate) fn malformed(detail: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("Malformed token: {detail}"))
    }

    pub(crate) fn from_storage_message(message: impl Into<String>) -> Self {
        Self::StorageError(message.into())
    }

    /// Returns `true` for [`TokenError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` for [`TokenError::Expired`].
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

#[cfg(feature = "sqlite-storage")]
impl From<rusqlite::Error> for TokenError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageError(format!("SQLite error: {err}"))
    }
}

#[cfg(feature = "redis-storage")]
impl From<redis::RedisError> for TokenError {
    fn from(err: redis::RedisError) -> Self {
        Self::StorageError(format!("Redis error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(TokenError::not_found().to_string(), "Token not found");
        assert_eq!(TokenError::type_mismatch().to_string(), "Token type invalid");
        assert_eq!(TokenError::Expired.to_string(), "Token expired");
        assert_eq!(
            TokenError::InvalidPayload("pipe".to_string()).to_string(),
            "Invalid payload: pipe"
        );
        assert_eq!(
            TokenError::from_storage_message("down").to_string(),
            "Storage error: down"
        );
        assert_eq!(
            TokenError::CryptoError("bad key".to_string()).to_string(),
            "Crypto error: bad key"
        );
        assert_eq!(
            TokenError::ConfigError("oops".to_string()).to_string(),
            "Config error: oops"
        );
    }

    #[test]
    fn test_malformed_is_not_found() {
        let err = TokenError::malformed("bad base64");
        assert!(err.is_not_found());
        assert!(!err.is_expired());
        assert_eq!(err.to_string(), "Malformed token: bad base64");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TokenError>();
    }
}
