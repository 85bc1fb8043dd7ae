//! Symmetric ciphers used by the token codec.
//!
//! A cipher turns a plaintext record into a standard-alphabet base64 string
//! and back. The codec applies the URL-safe transform on top. Decryption
//! fails on a wrong key, truncated input or any tampering; such failures are
//! reported as [`TokenError::NotFound`] because a forged token is
//! indistinguishable from one that never existed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::TokenError;

type HmacSha256 = Hmac<Sha256>;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block and CBC IV size.
const BLOCK_SIZE: usize = 16;

/// HMAC-SHA256 tag size.
const MAC_SIZE: usize = 32;

/// A symmetric cipher for token records.
///
/// # Implementation Notes
///
/// - `encrypt_string` must be randomized (fresh IV/nonce per call)
/// - `decrypt_string` must authenticate its input and fail on tampering
/// - Implementations should be `Send + Sync` so one instance can serve
///   concurrent requests
pub trait SymmetricCipher: Send + Sync {
    /// Returns the cipher name, e.g. `AES-256-CBC`.
    fn name(&self) -> &'static str;

    /// Required key length in bytes.
    fn key_size(&self) -> usize;

    /// Generates a fresh random key of [`SymmetricCipher::key_size`] bytes.
    fn generate_key(&self) -> Vec<u8> {
        let mut key = vec![0u8; self.key_size()];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Encrypts `plaintext` and returns standard base64 text.
    fn encrypt_string(&self, plaintext: &str, key: &[u8]) -> Result<String, TokenError>;

    /// Decrypts base64 text produced by [`SymmetricCipher::encrypt_string`].
    fn decrypt_string(&self, ciphertext: &str, key: &[u8]) -> Result<String, TokenError>;
}

/// Supported symmetric ciphers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CipherKind {
    /// AES-128 in CBC mode with an HMAC-SHA256 tag.
    Aes128Cbc,
    /// AES-256 in CBC mode with an HMAC-SHA256 tag.
    #[default]
    Aes256Cbc,
    /// AES-256 in GCM mode. Requires the `aes-gcm` feature.
    Aes256Gcm,
}

impl CipherKind {
    /// Returns the canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes128Cbc => "AES-128-CBC",
            Self::Aes256Cbc => "AES-256-CBC",
            Self::Aes256Gcm => "AES-256-GCM",
        }
    }

    /// Required key length in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }

    /// Creates the cipher implementation.
    pub fn build(&self) -> Result<Arc<dyn SymmetricCipher>, TokenError> {
        match self {
            Self::Aes128Cbc | Self::Aes256Cbc => Ok(Arc::new(AesCbcCipher::new(*self)?)),
            #[cfg(feature = "aes-gcm")]
            Self::Aes256Gcm => Ok(Arc::new(AesGcmCipher)),
            #[cfg(not(feature = "aes-gcm"))]
            Self::Aes256Gcm => Err(TokenError::ConfigError(
                "AES-256-GCM requires the `aes-gcm` feature".to_string(),
            )),
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherKind {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AES-128-CBC" => Ok(Self::Aes128Cbc),
            "AES-256-CBC" => Ok(Self::Aes256Cbc),
            "AES-256-GCM" => Ok(Self::Aes256Gcm),
            other => Err(TokenError::ConfigError(format!("Unsupported cipher '{other}'"))),
        }
    }
}

impl TryFrom<String> for CipherKind {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CipherKind> for String {
    fn from(kind: CipherKind) -> Self {
        kind.as_str().to_string()
    }
}

/// AES-CBC with PKCS#7 padding and an encrypt-then-MAC HMAC-SHA256 tag.
///
/// Output layout before base64: `iv (16) || ciphertext || tag (32)`, where
/// the tag covers `iv || ciphertext`.
#[derive(Debug, Clone, Copy)]
pub struct AesCbcCipher {
    kind: CipherKind,
}

impl AesCbcCipher {
    /// Creates a CBC cipher for [`CipherKind::Aes128Cbc`] or [`CipherKind::Aes256Cbc`].
    pub fn new(kind: CipherKind) -> Result<Self, TokenError> {
        match kind {
            CipherKind::Aes128Cbc | CipherKind::Aes256Cbc => Ok(Self { kind }),
            other => Err(TokenError::ConfigError(format!("{other} is not a CBC cipher"))),
        }
    }

    fn mac(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| TokenError::CryptoError(format!("Invalid HMAC key: {e}")))?;
        mac.update(iv);
        mac.update(ciphertext);
        Ok(mac)
    }
}

impl SymmetricCipher for AesCbcCipher {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    fn key_size(&self) -> usize {
        self.kind.key_size()
    }

    fn encrypt_string(&self, plaintext: &str, key: &[u8]) -> Result<String, TokenError> {
        if key.len() != self.key_size() {
            return Err(TokenError::CryptoError(format!(
                "{} requires a {}-byte key",
                self.name(),
                self.key_size()
            )));
        }

        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = match self.kind {
            CipherKind::Aes128Cbc => Aes128CbcEnc::new_from_slices(key, &iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes())),
            _ => Aes256CbcEnc::new_from_slices(key, &iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes())),
        }
        .map_err(|e| TokenError::CryptoError(format!("Failed to create cipher: {e}")))?;

        let tag = Self::mac(key, &iv, &ciphertext)?.finalize().into_bytes();

        let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len() + MAC_SIZE);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
        Ok(BASE64.encode(out))
    }

    fn decrypt_string(&self, ciphertext: &str, key: &[u8]) -> Result<String, TokenError> {
        if key.len() != self.key_size() {
            return Err(TokenError::malformed("key size mismatch"));
        }

        let raw = BASE64
            .decode(ciphertext)
            .map_err(|e| TokenError::malformed(format!("invalid base64: {e}")))?;
        if raw.len() < BLOCK_SIZE * 2 + MAC_SIZE {
            return Err(TokenError::malformed("ciphertext too short"));
        }

        let (iv, rest) = raw.split_at(BLOCK_SIZE);
        let (body, tag) = rest.split_at(rest.len() - MAC_SIZE);

        // Constant-time tag comparison
        Self::mac(key, iv, body)?
            .verify_slice(tag)
            .map_err(|_| TokenError::malformed("MAC mismatch"))?;

        let plaintext = match self.kind {
            CipherKind::Aes128Cbc => Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|e| TokenError::malformed(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(body),
            _ => Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|e| TokenError::malformed(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(body),
        }
        .map_err(|_| TokenError::malformed("invalid padding"))?;

        String::from_utf8(plaintext).map_err(|_| TokenError::malformed("invalid UTF-8"))
    }
}

#[cfg(feature = "aes-gcm")]
pub use gcm::AesGcmCipher;

#[cfg(feature = "aes-gcm")]
mod gcm {
    //! AES-256-GCM cipher.

    use super::{BASE64, SymmetricCipher};
    use crate::TokenError;
    use aes_gcm::{
        Aes256Gcm, Nonce,
        aead::{Aead, KeyInit},
    };
    use base64::Engine;
    use rand::RngCore;

    /// Nonce size for AES-256-GCM (96 bits)
    const NONCE_SIZE: usize = 12;

    /// AES-256-GCM. Output layout before base64: `nonce (12) || ciphertext+tag`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AesGcmCipher;

    impl SymmetricCipher for AesGcmCipher {
        fn name(&self) -> &'static str {
            "AES-256-GCM"
        }

        fn key_size(&self) -> usize {
            32
        }

        fn encrypt_string(&self, plaintext: &str, key: &[u8]) -> Result<String, TokenError> {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|e| TokenError::CryptoError(format!("Failed to create cipher: {e}")))?;

            let mut nonce_bytes = [0u8; NONCE_SIZE];
            rand::thread_rng().fill_bytes(&mut nonce_bytes);

            let ciphertext = cipher
                .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
                .map_err(|e| TokenError::CryptoError(format!("Encryption failed: {e}")))?;

            let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
            out.extend_from_slice(&nonce_bytes);
            out.extend_from_slice(&ciphertext);
            Ok(BASE64.encode(out))
        }

        fn decrypt_string(&self, ciphertext: &str, key: &[u8]) -> Result<String, TokenError> {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|_| TokenError::malformed("key size mismatch"))?;

            let raw = BASE64
                .decode(ciphertext)
                .map_err(|e| TokenError::malformed(format!("invalid base64: {e}")))?;
            if raw.len() <= NONCE_SIZE {
                return Err(TokenError::malformed("ciphertext too short"));
            }
            let (nonce, body) = raw.split_at(NONCE_SIZE);

            let plaintext = cipher
                .decrypt(Nonce::from_slice(nonce), body)
                .map_err(|_| TokenError::malformed("decryption failed"))?;

            String::from_utf8(plaintext).map_err(|_| TokenError::malformed("invalid UTF-8"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_ciphers() -> Vec<Arc<dyn SymmetricCipher>> {
        let mut kinds = vec![CipherKind::Aes128Cbc, CipherKind::Aes256Cbc];
        if cfg!(feature = "aes-gcm") {
            kinds.push(CipherKind::Aes256Gcm);
        }
        kinds.iter().map(|k| k.build().unwrap()).collect()
    }

    #[test]
    fn test_encrypt_decrypt() {
        for cipher in all_ciphers() {
            let key = cipher.generate_key();
            assert_eq!(key.len(), cipher.key_size());

            let encrypted = cipher.encrypt_string("a|b|42|reset|1700000000", &key).unwrap();
            let decrypted = cipher.decrypt_string(&encrypted, &key).unwrap();
            assert_eq!(decrypted, "a|b|42|reset|1700000000", "{}", cipher.name());
        }
    }

    #[test]
    fn test_encryption_is_randomized() {
        for cipher in all_ciphers() {
            let key = cipher.generate_key();
            let a = cipher.encrypt_string("same", &key).unwrap();
            let b = cipher.encrypt_string("same", &key).unwrap();
            assert_ne!(a, b, "{}", cipher.name());
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        for cipher in all_ciphers() {
            let encrypted = cipher
                .encrypt_string("secret", &cipher.generate_key())
                .unwrap();
            let result = cipher.decrypt_string(&encrypted, &cipher.generate_key());
            assert!(matches!(result, Err(TokenError::NotFound(_))), "{}", cipher.name());
        }
    }

    #[test]
    fn test_tampering_detected() {
        for cipher in all_ciphers() {
            let key = cipher.generate_key();
            let encrypted = cipher.encrypt_string("secret payload", &key).unwrap();

            let mut raw = BASE64.decode(&encrypted).unwrap();
            let middle = raw.len() / 2;
            raw[middle] ^= 0x01;
            let tampered = BASE64.encode(raw);

            let result = cipher.decrypt_string(&tampered, &key);
            assert!(matches!(result, Err(TokenError::NotFound(_))), "{}", cipher.name());
        }
    }

    #[test]
    fn test_garbage_rejected() {
        for cipher in all_ciphers() {
            let key = cipher.generate_key();
            assert!(cipher.decrypt_string("not base64!!", &key).is_err());
            assert!(cipher.decrypt_string("AAAA", &key).is_err());
            assert!(cipher.decrypt_string("", &key).is_err());
        }
    }

    #[test]
    fn test_encrypt_with_bad_key_size() {
        let cipher = AesCbcCipher::new(CipherKind::Aes256Cbc).unwrap();
        let result = cipher.encrypt_string("x", b"short");
        assert!(matches!(result, Err(TokenError::CryptoError(_))));
    }

    #[test]
    fn test_cipher_kind_parse() {
        assert_eq!("aes-256-cbc".parse::<CipherKind>().unwrap(), CipherKind::Aes256Cbc);
        assert_eq!("AES-128-CBC".parse::<CipherKind>().unwrap(), CipherKind::Aes128Cbc);
        assert_eq!("AES-256-GCM".parse::<CipherKind>().unwrap(), CipherKind::Aes256Gcm);
        assert!("DES".parse::<CipherKind>().is_err());
        assert_eq!(CipherKind::default().to_string(), "AES-256-CBC");
        assert!(AesCbcCipher::new(CipherKind::Aes256Gcm).is_err());
    }
}
