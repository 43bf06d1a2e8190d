//! Error types for `appvars-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. No variant ever carries key material or a variable value;
//! only names, identifiers, and operation descriptions.

use appvars_storage::StorageError;
use uuid::Uuid;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption failed (wrong key, corrupted ciphertext, or tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// HKDF key derivation failed.
    #[error("key derivation failed for context '{context}': {reason}")]
    KeyDerivation { context: String, reason: String },

    /// Ciphertext is too short to contain a valid nonce + tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// Supplied key material is not a 32-byte hex string.
    #[error("invalid key material: {reason}")]
    InvalidKey { reason: String },
}

/// Errors from the secret codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A stored or requested variable type is not recognized.
    #[error("unknown variable type '{var_type}'")]
    UnknownType { var_type: String },

    /// The underlying cipher failed.
    #[error("codec crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// An encrypted token is not valid base64.
    #[error("malformed encrypted token: {reason}")]
    InvalidToken { reason: String },

    /// Decrypted bytes are not valid UTF-8.
    #[error("decrypted value is not valid UTF-8: {reason}")]
    InvalidUtf8 { reason: String },
}

/// Errors from the variable store and the audit trail.
#[derive(Debug, thiserror::Error)]
pub enum VariableError {
    /// The owning application does not exist.
    #[error("application not found: {scope}")]
    ApplicationNotFound { scope: String },

    /// No variable with this name exists in the application.
    #[error("variable not found: {name}")]
    VariableNotFound { name: String },

    /// No audit snapshot with this id belongs to the application.
    #[error("variable audit not found: {id}")]
    AuditNotFound { id: Uuid },

    /// A variable with this name already exists in the application.
    #[error("variable already exists: {name}")]
    AlreadyExists { name: String },

    /// Encryption, decryption, or token decoding failed.
    #[error("variable codec error: {0}")]
    Codec(#[from] CodecError),

    /// The storage backend failed.
    #[error("variable storage error: {0}")]
    Storage(#[from] StorageError),

    /// An audit snapshot could not be encoded or decoded.
    #[error("audit snapshot serialization failed: {reason}")]
    Serialization { reason: String },
}

impl VariableError {
    /// Whether this error means the addressed resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ApplicationNotFound { .. }
                | Self::VariableNotFound { .. }
                | Self::AuditNotFound { .. }
        )
    }
}
