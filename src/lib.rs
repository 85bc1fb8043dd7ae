//! # Token Auth
//!
//! A Rust library for issuing and validating short-lived, typed, expiring tokens.
//!
//! Tokens carry an opaque payload (an email address, a user id, a list of
//! fields) together with a unique id, a purpose ("type") and an absolute
//! expiry. They are meant for password resets, email verification, one-time
//! login links, invitations and similar flows.
//!
//! ## Features
//!
//! - **Symmetric Tokens**: Payload, id, type and expiry encrypted with an
//!   application key into a URL-safe string
//! - **Hybrid Tokens**: Tokens only the holder of an RSA private key can open
//! - **Hash Challenges**: Random tokens whose verification data is stored as a
//!   one-way hash together with a user-supplied code
//! - **Type Binding**: A token issued for one purpose is rejected for any other
//! - **Strict Mode**: Optional store-backed liveness check, so tokens can be revoked
//! - **Distributed Ids**: Time-ordered 64-bit ids with a per-instance sequence
//!   kept in a shared store
//! - **Pluggable Storage**: In-memory, SQLite and Redis backends behind one trait
//! - **Async Support**: Fully asynchronous API design
//!
//! ## Quick Start
//!
//! ### Symmetric Tokens
//!
//! ```rust
//! use token_auth::{TokenConfig, TokenManager};
//!
//! # async fn example() -> Result<(), token_auth::TokenError> {
//! let manager = TokenManager::builder()
//!     .with_config(TokenConfig {
//!         key: "base64:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
//!         ..TokenConfig::default()
//!     })
//!     .build_and_init()
//!     .await?;
//!
//! let issued = manager.create("reset", "user@example.com", 0).await?;
//! println!("send {} (valid for {}s)", issued.token(), issued.ttl());
//!
//! // Later, when the link is clicked
//! let token = manager.validate("reset", issued.token(), true).await?;
//! assert_eq!(token.payload().as_scalar(), Some("user@example.com"));
//! # Ok(())
//! # }
//! ```
//!
//! ### Hash Challenges
//!
//! ```rust
//! use token_auth::TokenManager;
//!
//! # async fn example(manager: TokenManager) -> Result<(), token_auth::TokenError> {
//! // The token goes to the client, the code goes out of band (e.g. by SMS)
//! let issued = manager.hash("login", "user-42", "314159", 42).await?;
//!
//! // The client presents both
//! manager.check_code("login", "user-42", issued.token(), "314159").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`TokenConfig`] can be built in code, parsed from JSON or read from the
//! environment:
//!
//! ```bash
//! export TOKEN_KEY="base64:..."        # symmetric key, raw or base64: prefixed
//! export TOKEN_HASH_KEY="..."          # HMAC key for hash challenges
//! export TOKEN_TTL=900                 # default lifetime in seconds
//! export TOKEN_CIPHER=AES-256-CBC      # AES-128-CBC, AES-256-CBC, AES-256-GCM
//! export TOKEN_STORE=memory            # memory, sqlite:<path>, redis://...
//! export TOKEN_INSTANCE_ID=0           # 0..=4095, unique per process
//! ```
//!
//! ## Architecture
//!
//! - **[`TokenManager`]**: Issuance and validation engine
//! - **[`Token`]**: The value returned by every issuance and validation call
//! - **[`storage::TokenStore`]**: Key/value store with TTL and atomic counters
//! - **[`cleanup::CleanupStrategy`]**: When expired store entries are purged
//! - **[`SymmetricCipher`]**, **[`AsymmetricCipher`]**, **[`SecretHasher`]**:
//!   Cryptographic seams, with AES, RSA and Argon2id implementations
//! - **[`TokenError`]**: Error handling for all failure modes

pub mod token;

pub use token::{cleanup, storage};

// Re-export commonly used types
pub use token::{
    Argon2Hasher, AsymmetricCipher, AesCbcCipher, CipherKind, CleanupStrategy, ConfigPreset,
    DEFAULT_TTL, DELIMITER, IdGenerator, IdParts, MAX_INSTANCE_ID, MAX_SEQUENCE, Payload,
    RsaCipher, RsaKeyPair, RsaPadding, SecretHasher, SymmetricCipher, TimeProviderFn, Token,
    TokenConfig, TokenError, TokenManager, TokenManagerBuilder, TokenResponse, TypeConfig,
    decode_url_safe, encode_url_safe,
};

#[cfg(feature = "aes-gcm")]
pub use token::AesGcmCipher;
