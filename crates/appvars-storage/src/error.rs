//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Unique-constraint violations get their own variant so
//! callers never have to inspect driver messages to detect duplicates.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or migrate the storage backend.
    #[error("failed to open storage at '{target}': {reason}")]
    Open { target: String, reason: String },

    /// A query failed for a reason other than a constraint violation.
    #[error("{operation} failed: {reason}")]
    Query { operation: String, reason: String },

    /// A uniqueness constraint rejected the write.
    #[error("unique constraint '{constraint}' violated")]
    UniqueViolation { constraint: String },

    /// Failed to begin, commit, or roll back a transaction.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },

    /// A stored row could not be decoded.
    #[error("corrupt row: {reason}")]
    Corrupt { reason: String },
}

impl StorageError {
    /// Whether this error is a uniqueness violation.
    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}
