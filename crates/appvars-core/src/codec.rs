//! Secret codec: per-value encryption keyed by the variable's type.
//!
//! The codec decides how a value is split across the clear and cipher
//! columns. Non-secret kinds pass through untouched; secret kinds are sealed
//! with AES-256-GCM and never appear in the clear column.

use crate::crypto::EncryptionKey;
use crate::error::{CodecError, CryptoError};
use crate::placeholder::PASSWORD_PLACEHOLDER;
use crate::variable::VariableType;

/// HKDF `info` label for the key that seals variable values.
pub const VARIABLE_KEY_INFO: &[u8] = b"appvars-variable-v1";

/// A value split into its persisted columns.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedValue {
    /// Clear column. `None` for secret kinds.
    pub clear: Option<String>,
    /// Cipher column. Empty for non-secret kinds.
    pub cipher: Vec<u8>,
}

impl std::fmt::Debug for SealedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedValue")
            .field("clear", &self.clear.as_ref().map(|_| "[..]"))
            .field("cipher_len", &self.cipher.len())
            .finish()
    }
}

/// Encrypt/decrypt capability consumed by the variable store.
pub trait SecretCodec: Send + Sync {
    /// Split `plaintext` into clear and cipher columns for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Crypto`] if sealing a secret fails.
    fn encrypt(&self, kind: VariableType, plaintext: &str) -> Result<SealedValue, CodecError>;

    /// Rebuild a value from its columns.
    ///
    /// Non-secret kinds always return `clear`. Secret kinds return the
    /// decrypted plaintext when `want_plaintext` is set and the redaction
    /// placeholder otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Crypto`] on corrupt or undecryptable input and
    /// [`CodecError::InvalidUtf8`] if the plaintext is not UTF-8.
    fn decrypt(
        &self,
        kind: VariableType,
        clear: Option<&str>,
        cipher: &[u8],
        want_plaintext: bool,
    ) -> Result<String, CodecError>;
}

/// AES-256-GCM codec with an explicitly injected key.
#[derive(Debug, Clone)]
pub struct AesGcmCodec {
    key: EncryptionKey,
}

impl AesGcmCodec {
    /// Build a codec that seals values with `key` directly.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Build a codec whose key is derived from `root_key` with
    /// [`VARIABLE_KEY_INFO`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if HKDF expansion fails.
    pub fn derive(root_key: &EncryptionKey) -> Result<Self, CryptoError> {
        Ok(Self {
            key: root_key.derive(VARIABLE_KEY_INFO)?,
        })
    }
}

impl SecretCodec for AesGcmCodec {
    fn encrypt(&self, kind: VariableType, plaintext: &str) -> Result<SealedValue, CodecError> {
        if !kind.is_secret() {
            return Ok(SealedValue {
                clear: Some(plaintext.to_owned()),
                cipher: Vec::new(),
            });
        }

        let cipher = self.key.seal(plaintext.as_bytes())?;
        Ok(SealedValue {
            clear: None,
            cipher,
        })
    }

    fn decrypt(
        &self,
        kind: VariableType,
        clear: Option<&str>,
        cipher: &[u8],
        want_plaintext: bool,
    ) -> Result<String, CodecError> {
        if !kind.is_secret() {
            return Ok(clear.unwrap_or_default().to_owned());
        }
        if !want_plaintext {
            return Ok(PASSWORD_PLACEHOLDER.to_owned());
        }

        let plaintext = self.key.open(cipher)?;
        String::from_utf8(plaintext).map_err(|e| CodecError::InvalidUtf8 {
            reason: e.utf8_error().to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn codec() -> AesGcmCodec {
        AesGcmCodec::derive(&EncryptionKey::generate()).unwrap()
    }

    #[test]
    fn non_secret_stays_in_clear_column() {
        let sealed = codec().encrypt(VariableType::String, "prod").unwrap();
        assert_eq!(sealed.clear.as_deref(), Some("prod"));
        assert!(sealed.cipher.is_empty());
    }

    #[test]
    fn secret_never_reaches_clear_column() {
        let sealed = codec().encrypt(VariableType::Password, "s3cr3t").unwrap();
        assert_eq!(sealed.clear, None);
        assert!(!sealed.cipher.is_empty());
        assert!(!sealed.cipher.windows(6).any(|w| w == b"s3cr3t"));
    }

    #[test]
    fn secret_roundtrip_with_plaintext_wanted() {
        let codec = codec();
        let sealed = codec.encrypt(VariableType::Key, "-----BEGIN KEY-----").unwrap();
        let value = codec
            .decrypt(VariableType::Key, None, &sealed.cipher, true)
            .unwrap();
        assert_eq!(value, "-----BEGIN KEY-----");
    }

    #[test]
    fn secret_without_plaintext_wanted_is_placeholder() {
        let codec = codec();
        let sealed = codec.encrypt(VariableType::Password, "s3cr3t").unwrap();
        let value = codec
            .decrypt(VariableType::Password, None, &sealed.cipher, false)
            .unwrap();
        assert_eq!(value, PASSWORD_PLACEHOLDER);
    }

    #[test]
    fn non_secret_ignores_plaintext_flag() {
        let codec = codec();
        for want in [true, false] {
            let value = codec
                .decrypt(VariableType::Number, Some("42"), &[], want)
                .unwrap();
            assert_eq!(value, "42");
        }
    }

    #[test]
    fn other_key_cannot_decrypt() {
        let sealed = codec().encrypt(VariableType::Password, "s3cr3t").unwrap();
        let result = codec().decrypt(VariableType::Password, None, &sealed.cipher, true);
        assert!(matches!(result, Err(CodecError::Crypto(CryptoError::Decryption { .. }))));
    }

    #[test]
    fn corrupt_blob_is_codec_error() {
        let result = codec().decrypt(VariableType::Password, None, b"short", true);
        assert!(matches!(
            result,
            Err(CodecError::Crypto(CryptoError::CiphertextTooShort { .. }))
        ));
    }

    #[test]
    fn derived_key_differs_from_root() {
        let root = EncryptionKey::generate();
        let sealed = AesGcmCodec::derive(&root)
            .unwrap()
            .encrypt(VariableType::Password, "s3cr3t")
            .unwrap();
        let with_root = AesGcmCodec::new(root).decrypt(VariableType::Password, None, &sealed.cipher, true);
        assert!(with_root.is_err());
    }
}
