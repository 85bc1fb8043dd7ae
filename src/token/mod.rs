// Core architecture components
mod codec;
mod config;
mod error;
mod manager;
mod manager_builder;
mod time_utils;
mod value;

// Identity allocation
pub mod id;

// Storage backends
pub mod cleanup;
pub mod storage;

// Cryptographic primitives
pub mod asymmetric;
pub mod cipher;
pub mod hasher;

// Core components exports
pub use codec::{DELIMITER, decode_url_safe, encode_url_safe};
pub use config::{ConfigPreset, DEFAULT_TTL, TokenConfig, TypeConfig};
pub use error::TokenError;
pub use manager::TokenManager;
pub use manager_builder::TokenManagerBuilder;
pub use time_utils::TimeProviderFn;
pub use value::{Payload, Token, TokenResponse};

pub use id::{IdGenerator, IdParts, MAX_INSTANCE_ID, MAX_SEQUENCE};

// Storage exports
pub use cleanup::{
    BoxedCleanupStrategy, CleanupStrategy, CustomCleanupStrategy, HybridCleanupStrategy,
};
pub use storage::{DEFAULT_KEY_PREFIX, MemoryStorage, StorageStats, StoreKind, TokenStore};

// Cryptography exports
pub use asymmetric::{AsymmetricCipher, RsaCipher, RsaKeyPair, RsaPadding};
#[cfg(feature = "aes-gcm")]
pub use cipher::AesGcmCipher;
pub use cipher::{AesCbcCipher, CipherKind, SymmetricCipher};
pub use hasher::{Argon2Hasher, SecretHasher};
