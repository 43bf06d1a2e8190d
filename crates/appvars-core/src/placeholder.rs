//! Placeholder protocol.
//!
//! Every read path picks a [`ReadMode`] per call. Non-secret values are the
//! same in every mode; secret values come back as plaintext, as a base64
//! encrypted token, or as [`PASSWORD_PLACEHOLDER`]. Redaction happens here,
//! independently of what the codec would return without plaintext.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::codec::SecretCodec;
use crate::error::CodecError;
use crate::variable::VariableType;

/// Fixed marker substituted for secret values on redacted reads.
pub const PASSWORD_PLACEHOLDER: &str = "**********";

/// How secret values are rendered on a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Decrypted plaintext for every kind. Privileged callers only.
    Plaintext,
    /// Secret kinds return their cipher blob as standard base64.
    #[serde(rename = "encrypted")]
    EncryptedToken,
    /// Secret kinds return [`PASSWORD_PLACEHOLDER`].
    #[default]
    Redacted,
}

/// Whether values of `kind` need the placeholder on untrusted reads.
#[must_use]
pub const fn needs_placeholder(kind: VariableType) -> bool {
    kind.is_secret()
}

/// Whether a write of `value` to a `kind` variable is a redacted read being
/// sent back unchanged.
#[must_use]
pub fn is_unchanged_secret(kind: VariableType, value: &str) -> bool {
    needs_placeholder(kind) && value == PASSWORD_PLACEHOLDER
}

/// Render a stored value for the given read mode.
///
/// # Errors
///
/// Returns the codec's error when plaintext is requested for a secret that
/// cannot be decrypted.
pub fn render(
    codec: &dyn SecretCodec,
    kind: VariableType,
    clear: Option<&str>,
    cipher: &[u8],
    mode: ReadMode,
) -> Result<String, CodecError> {
    if !needs_placeholder(kind) {
        return codec.decrypt(kind, clear, cipher, false);
    }

    match mode {
        ReadMode::Plaintext => codec.decrypt(kind, clear, cipher, true),
        ReadMode::EncryptedToken => Ok(encode_token(cipher)),
        ReadMode::Redacted => Ok(PASSWORD_PLACEHOLDER.to_owned()),
    }
}

/// Encode a cipher blob as a text-safe token.
#[must_use]
pub fn encode_token(cipher: &[u8]) -> String {
    STANDARD.encode(cipher)
}

/// Decode a token produced by [`encode_token`].
///
/// # Errors
///
/// Returns [`CodecError::InvalidToken`] if `token` is not valid base64.
pub fn decode_token(token: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD.decode(token).map_err(|e| CodecError::InvalidToken {
        reason: e.to_string(),
    })
}
