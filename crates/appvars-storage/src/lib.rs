//! Storage boundary for `AppVars`.
//!
//! This crate defines the [`StorageBackend`] trait over the two tables the
//! variable store owns (`variable` and `variable_audit`) plus the narrow
//! slice of the external `application` table it touches (scope resolution
//! and the `last_modified` bump). Backends know nothing about secret kinds
//! or encryption: they persist whatever clear and cipher columns the core
//! hands them.
//!
//! Two implementations are provided:
//!
//! - [`PostgresBackend`]: production backend over `sqlx` (feature `postgres-backend`)
//! - [`MemoryBackend`]: in-memory, for tests and local development

mod error;
mod memory;
#[cfg(feature = "postgres-backend")]
mod postgres_backend;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "postgres-backend")]
pub use postgres_backend::PostgresBackend;

/// Identifies the application that owns a variable collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ApplicationScope {
    /// Address the application by its identifier.
    Id(Uuid),
    /// Address the application by project key and application name.
    Name {
        project_key: String,
        application: String,
    },
}

impl ApplicationScope {
    /// Build a name-based scope.
    #[must_use]
    pub fn named(project_key: impl Into<String>, application: impl Into<String>) -> Self {
        Self::Name {
            project_key: project_key.into(),
            application: application.into(),
        }
    }
}

impl From<Uuid> for ApplicationScope {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl std::fmt::Display for ApplicationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name {
                project_key,
                application,
            } => write!(f, "{project_key}/{application}"),
        }
    }
}

/// A persisted variable row, exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct VariableRow {
    pub id: Uuid,
    pub name: String,
    /// Clear column. `None` for secret kinds.
    pub clear_value: Option<String>,
    /// Cipher column. Empty for non-secret kinds.
    pub cipher_value: Vec<u8>,
    pub var_type: String,
}

/// Column values for an insert or an update-by-name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableWrite {
    pub name: String,
    pub clear_value: Option<String>,
    pub cipher_value: Vec<u8>,
    pub var_type: String,
}

/// A persisted audit snapshot row. `data` is the serialized collection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct AuditRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub versioned: DateTime<Utc>,
    pub data: String,
    pub author: String,
}

/// Storage for application-scoped variables and their audit snapshots.
///
/// Every mutating method that changes at least one variable row also bumps
/// the owning application's `last_modified` inside the same transaction, so
/// a failed bump never leaves a committed row change behind.
/// [`delete_all_variables`](StorageBackend::delete_all_variables) bumps even
/// when nothing was deleted.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Resolve a scope to an application identifier.
    ///
    /// Returns `Ok(None)` if no such application exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the underlying backend fails.
    async fn resolve_application(
        &self,
        scope: &ApplicationScope,
    ) -> Result<Option<Uuid>, StorageError>;

    /// Read an application's `last_modified` timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the underlying backend fails.
    async fn last_modified(&self, application_id: Uuid)
    -> Result<Option<DateTime<Utc>>, StorageError>;

    /// List every variable of an application, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the underlying backend fails.
    async fn list_variables(&self, application_id: Uuid) -> Result<Vec<VariableRow>, StorageError>;

    /// Fetch one variable by name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the underlying backend fails.
    async fn get_variable(
        &self,
        application_id: Uuid,
        name: &str,
    ) -> Result<Option<VariableRow>, StorageError>;

    /// Insert a new variable and bump `last_modified`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UniqueViolation`] if the name is already taken
    /// within the application.
    async fn insert_variable(
        &self,
        application_id: Uuid,
        row: &VariableWrite,
    ) -> Result<VariableRow, StorageError>;

    /// Overwrite the clear, cipher, and type columns of the variable named
    /// `row.name`. Returns the number of rows changed; `last_modified` is
    /// bumped only when it is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] or [`StorageError::Transaction`] on
    /// backend failure.
    async fn update_variable(
        &self,
        application_id: Uuid,
        row: &VariableWrite,
    ) -> Result<u64, StorageError>;

    /// Delete one variable by name. Returns the number of rows removed;
    /// `last_modified` is bumped only when it is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] or [`StorageError::Transaction`] on
    /// backend failure.
    async fn delete_variable(&self, application_id: Uuid, name: &str) -> Result<u64, StorageError>;

    /// Delete every variable of an application and bump `last_modified`
    /// unconditionally. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] or [`StorageError::Transaction`] on
    /// backend failure.
    async fn delete_all_variables(&self, application_id: Uuid) -> Result<u64, StorageError>;

    /// Append an audit snapshot stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the underlying backend fails.
    async fn insert_audit(
        &self,
        application_id: Uuid,
        author: &str,
        data: &str,
    ) -> Result<AuditRow, StorageError>;

    /// Fetch one audit snapshot owned by the application.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the underlying backend fails.
    async fn get_audit(
        &self,
        application_id: Uuid,
        audit_id: Uuid,
    ) -> Result<Option<AuditRow>, StorageError>;

    /// List every audit snapshot of an application, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] if the underlying backend fails.
    async fn list_audits(&self, application_id: Uuid) -> Result<Vec<AuditRow>, StorageError>;
}
