//! Variable domain types.
//!
//! A variable is a `(name, type, value)` triple owned by an application.
//! The type decides whether the value is a secret: `password` and `key`
//! values are encrypted at rest and redacted on untrusted reads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CodecError;

/// The declared kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Text,
    Boolean,
    Number,
    Password,
    Key,
}

impl VariableType {
    /// Whether values of this kind are secret and need a placeholder on
    /// untrusted reads.
    #[must_use]
    pub const fn is_secret(self) -> bool {
        matches!(self, Self::Password | Self::Key)
    }

    /// The name stored in the `var_type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Password => "password",
            Self::Key => "key",
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VariableType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(Self::String),
            "text" => Ok(Self::Text),
            "boolean" => Ok(Self::Boolean),
            "number" => Ok(Self::Number),
            "password" => Ok(Self::Password),
            "key" => Ok(Self::Key),
            other => Err(CodecError::UnknownType {
                var_type: other.to_owned(),
            }),
        }
    }
}

/// A variable as returned to callers.
///
/// Depending on the read mode `value` holds plaintext, an encrypted token,
/// or the redaction placeholder. `Debug` never prints secret values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub id: Uuid,
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: VariableType,
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value: &dyn std::fmt::Debug = if self.kind.is_secret() {
            &"[REDACTED]"
        } else {
            &self.value
        };
        f.debug_struct("Variable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", value)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Caller-supplied values for an insert or update.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct VariableInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableType,
    pub value: String,
}

impl VariableInput {
    /// Build an input triple.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: VariableType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: value.into(),
        }
    }
}

impl std::fmt::Debug for VariableInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableInput")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
