//! Key material and the AES-256-GCM cipher behind the secret codec.
//!
//! A sealed blob is `nonce (12 bytes) || ciphertext || tag (16 bytes)` with a
//! fresh random nonce per call. The configured root key never seals a value
//! itself; the codec derives a labelled key from it with HKDF-SHA256.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A 256-bit key, wiped from memory on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a random key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&Aes256Gcm::generate_key(OsRng));
        Self(bytes)
    }

    /// Parse a key from 64 hex characters (surrounding whitespace ignored).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the input is not hex or does
    /// not decode to exactly 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let decoded =
            Zeroizing::new(hex::decode(encoded.trim()).map_err(|e| CryptoError::InvalidKey {
                reason: e.to_string(),
            })?);
        let bytes = <[u8; 32]>::try_from(decoded.as_slice()).map_err(|_| {
            CryptoError::InvalidKey {
                reason: format!("expected 32 bytes, got {}", decoded.len()),
            }
        })?;
        Ok(Self(bytes))
    }

    /// Derive the key bound to `label` (the HKDF `info`, no salt).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if HKDF expansion fails.
    pub fn derive(&self, label: &[u8]) -> Result<Self, CryptoError> {
        let mut derived = Self([0u8; 32]);
        Hkdf::<Sha256>::new(None, &self.0)
            .expand(label, &mut derived.0)
            .map_err(|e| CryptoError::KeyDerivation {
                context: String::from_utf8_lossy(label).into_owned(),
                reason: e.to_string(),
            })?;
        Ok(derived)
    }

    /// Encrypt `plaintext` into a self-contained blob.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::Encryption {
                reason: e.to_string(),
            })?;

        let mut blob = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::CiphertextTooShort`] if the blob cannot hold a
    /// nonce and a tag, and [`CryptoError::Decryption`] if authentication
    /// fails.
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let min = NONCE_LEN + TAG_LEN;
        if blob.len() < min {
            return Err(CryptoError::CiphertextTooShort {
                expected: min,
                actual: blob.len(),
            });
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CryptoError::Decryption {
                reason: e.to_string(),
            })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}
