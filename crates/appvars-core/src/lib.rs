//! Core library for `AppVars`.
//!
//! A secret-aware key/value store scoped to an application:
//!
//! - [`codec`]: per-type sealing of values, AES-256-GCM for secret kinds
//! - [`placeholder`]: read modes and redaction of secret values
//! - [`store`]: CRUD over an application's variables
//! - [`audit`]: point-in-time snapshots of the collection
//!
//! Persistence is delegated to an [`appvars_storage::StorageBackend`].

pub mod audit;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod placeholder;
pub mod store;
pub mod variable;

pub use appvars_storage::ApplicationScope;
pub use audit::{AuditTrail, VariableAudit};
pub use codec::{AesGcmCodec, SecretCodec};
pub use error::{CodecError, CryptoError, VariableError};
pub use placeholder::{PASSWORD_PLACEHOLDER, ReadMode};
pub use store::{UpdateOutcome, VariableStore};
pub use variable::{Variable, VariableInput, VariableType};
