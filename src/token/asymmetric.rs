//! Public-key primitives for the hybrid encryption path.
//!
//! Only the one-time symmetric key of a hybrid token is encrypted with the
//! recipient's public key, so these operations always handle a few dozen
//! bytes regardless of payload size.

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::TokenError;

/// An asymmetric cipher keyed by PEM-encoded keys.
pub trait AsymmetricCipher: Send + Sync {
    /// Returns the name/identifier of this algorithm.
    fn name(&self) -> &'static str;

    /// Encrypts `data` for the holder of the private key matching `public_key_pem`.
    ///
    /// Fails with [`TokenError::CryptoError`] if the key cannot be parsed or
    /// `data` is too long for it.
    fn public_encrypt(&self, data: &[u8], public_key_pem: &str) -> Result<Vec<u8>, TokenError>;

    /// Decrypts data produced by [`AsymmetricCipher::public_encrypt`].
    ///
    /// Any failure, including an unparsable key, is reported as
    /// [`TokenError::NotFound`].
    fn private_decrypt(
        &self,
        ciphertext: &[u8],
        private_key_pem: &str,
    ) -> Result<Vec<u8>, TokenError>;
}

/// RSA encryption padding scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RsaPadding {
    /// PKCS#1 v1.5, compatible with OpenSSL's default `public_encrypt`.
    #[default]
    Pkcs1v15,
    /// OAEP with SHA-256.
    OaepSha256,
}

/// RSA public-key encryption.
///
/// Accepts SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`)
/// public keys and PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1
/// (`BEGIN RSA PRIVATE KEY`) private keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaCipher {
    padding: RsaPadding,
}

impl RsaCipher {
    pub fn new(padding: RsaPadding) -> Self {
        Self { padding }
    }

    fn parse_public(pem: &str) -> Result<RsaPublicKey, TokenError> {
        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| TokenError::CryptoError(format!("Invalid RSA public key: {e}")))
    }

    fn parse_private(pem: &str) -> Result<RsaPrivateKey, TokenError> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| TokenError::NotFound("Invalid private key".to_string()))
    }
}

impl AsymmetricCipher for RsaCipher {
    fn name(&self) -> &'static str {
        match self.padding {
            RsaPadding::Pkcs1v15 => "rsa-pkcs1v15",
            RsaPadding::OaepSha256 => "rsa-oaep-sha256",
        }
    }

    fn public_encrypt(&self, data: &[u8], public_key_pem: &str) -> Result<Vec<u8>, TokenError> {
        let public_key = Self::parse_public(public_key_pem)?;
        let mut rng = OsRng;
        match self.padding {
            RsaPadding::Pkcs1v15 => public_key.encrypt(&mut rng, Pkcs1v15Encrypt, data),
            RsaPadding::OaepSha256 => public_key.encrypt(&mut rng, Oaep::new::<Sha256>(), data),
        }
        .map_err(|e| TokenError::CryptoError(format!("RSA encryption failed: {e}")))
    }

    fn private_decrypt(
        &self,
        ciphertext: &[u8],
        private_key_pem: &str,
    ) -> Result<Vec<u8>, TokenError> {
        let private_key = Self::parse_private(private_key_pem)?;
        match self.padding {
            RsaPadding::Pkcs1v15 => private_key.decrypt(Pkcs1v15Encrypt, ciphertext),
            RsaPadding::OaepSha256 => private_key.decrypt(Oaep::new::<Sha256>(), ciphertext),
        }
        .map_err(|_| TokenError::NotFound("Token key could not be decrypted".to_string()))
    }
}

/// A PEM-encoded RSA key pair.
#[derive(Clone)]
pub struct RsaKeyPair {
    /// SPKI public key PEM
    pub public_pem: String,
    /// PKCS#8 private key PEM
    pub private_pem: String,
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("public_pem", &self.public_pem)
            .field("private_pem", &"<redacted>")
            .finish()
    }
}

impl RsaKeyPair {
    /// Generates a new key pair with a modulus of `bits` bits.
    pub fn generate(bits: usize) -> Result<Self, TokenError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| TokenError::CryptoError(format!("RSA key generation failed: {e}")))?;

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| TokenError::CryptoError(e.to_string()))?
            .to_string();

        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| TokenError::CryptoError(e.to_string()))?;

        Ok(Self {
            public_pem,
            private_pem,
        })
    }
}
