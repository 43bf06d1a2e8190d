//! Application variable store.
//!
//! CRUD over the variable collection of one application. Values are sealed
//! by the [`SecretCodec`] on write and rendered through the placeholder
//! protocol on read. Each successful mutation bumps the application's
//! `last_modified` in the same storage transaction as the row change.

use std::sync::Arc;

use appvars_storage::{ApplicationScope, StorageBackend, VariableRow, VariableWrite};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::SecretCodec;
use crate::error::VariableError;
use crate::placeholder::{self, ReadMode};
use crate::variable::{Variable, VariableInput, VariableType};

/// Result of an update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The row was rewritten and `last_modified` bumped.
    Updated,
    /// The value was the redaction placeholder for a secret; nothing was written.
    Unchanged,
}

/// Variable store over a storage backend and a secret codec.
///
/// Cheap to clone; clones share the backend and codec.
#[derive(Clone)]
pub struct VariableStore {
    backend: Arc<dyn StorageBackend>,
    codec: Arc<dyn SecretCodec>,
}

impl std::fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableStore").finish_non_exhaustive()
    }
}

impl VariableStore {
    /// Create a store over the given backend and codec.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, codec: Arc<dyn SecretCodec>) -> Self {
        Self { backend, codec }
    }

    pub(crate) fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub(crate) fn codec(&self) -> &dyn SecretCodec {
        self.codec.as_ref()
    }

    /// Resolve a scope to its application id.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::ApplicationNotFound`] if the scope matches no
    /// application.
    pub async fn resolve(&self, scope: &ApplicationScope) -> Result<Uuid, VariableError> {
        self.backend
            .resolve_application(scope)
            .await?
            .ok_or_else(|| VariableError::ApplicationNotFound {
                scope: scope.to_string(),
            })
    }

    /// The application's `last_modified` timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::ApplicationNotFound`] for an unknown scope.
    pub async fn last_modified(
        &self,
        scope: &ApplicationScope,
    ) -> Result<DateTime<Utc>, VariableError> {
        let application_id = self.resolve(scope).await?;
        self.backend
            .last_modified(application_id)
            .await?
            .ok_or_else(|| VariableError::ApplicationNotFound {
                scope: scope.to_string(),
            })
    }

    /// List every variable, ordered by name, rendered with `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::Codec`] if a stored type is unknown or a
    /// secret cannot be decrypted in plaintext mode.
    pub async fn list(
        &self,
        scope: &ApplicationScope,
        mode: ReadMode,
    ) -> Result<Vec<Variable>, VariableError> {
        let application_id = self.resolve(scope).await?;
        self.list_resolved(application_id, mode).await
    }

    pub(crate) async fn list_resolved(
        &self,
        application_id: Uuid,
        mode: ReadMode,
    ) -> Result<Vec<Variable>, VariableError> {
        let rows = self.backend.list_variables(application_id).await?;
        rows.into_iter().map(|row| self.present(row, mode)).collect()
    }

    /// Load one variable by name. Secrets are always redacted.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::VariableNotFound`] if no such variable exists.
    pub async fn load(
        &self,
        scope: &ApplicationScope,
        name: &str,
    ) -> Result<Variable, VariableError> {
        let application_id = self.resolve(scope).await?;
        let row = self
            .backend
            .get_variable(application_id, name)
            .await?
            .ok_or_else(|| VariableError::VariableNotFound {
                name: name.to_owned(),
            })?;
        self.present(row, ReadMode::Redacted)
    }

    /// Insert a new variable. Returns it in redacted form.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::AlreadyExists`] if the name is taken.
    pub async fn insert(
        &self,
        scope: &ApplicationScope,
        input: &VariableInput,
    ) -> Result<Variable, VariableError> {
        let application_id = self.resolve(scope).await?;
        let write = self.seal(input)?;

        let stored = self
            .backend
            .insert_variable(application_id, &write)
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    VariableError::AlreadyExists {
                        name: input.name.clone(),
                    }
                } else {
                    VariableError::Storage(e)
                }
            })?;

        info!(
            application_id = %application_id,
            name = %input.name,
            kind = %input.kind,
            "variable inserted"
        );
        self.present(stored, ReadMode::Redacted)
    }

    /// Overwrite a variable's type and value by name.
    ///
    /// A secret whose value is the redaction placeholder is left untouched
    /// and [`UpdateOutcome::Unchanged`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::VariableNotFound`] if no row matched.
    pub async fn update(
        &self,
        scope: &ApplicationScope,
        input: &VariableInput,
    ) -> Result<UpdateOutcome, VariableError> {
        if placeholder::is_unchanged_secret(input.kind, &input.value) {
            debug!(name = %input.name, "placeholder value, skipping update");
            return Ok(UpdateOutcome::Unchanged);
        }

        let application_id = self.resolve(scope).await?;
        self.update_resolved(application_id, input).await
    }

    /// Apply [`update`](Self::update) to each input in order, stopping at
    /// the first error. Returns how many variables were rewritten.
    ///
    /// Entries before a failing one stay applied.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub async fn update_many(
        &self,
        scope: &ApplicationScope,
        inputs: &[VariableInput],
    ) -> Result<usize, VariableError> {
        let application_id = self.resolve(scope).await?;

        let mut rewritten = 0usize;
        for input in inputs {
            if placeholder::is_unchanged_secret(input.kind, &input.value) {
                continue;
            }
            if self.update_resolved(application_id, input).await? == UpdateOutcome::Updated {
                rewritten = rewritten.saturating_add(1);
            }
        }
        Ok(rewritten)
    }

    async fn update_resolved(
        &self,
        application_id: Uuid,
        input: &VariableInput,
    ) -> Result<UpdateOutcome, VariableError> {
        let write = self.seal(input)?;
        let changed = self.backend.update_variable(application_id, &write).await?;
        if changed == 0 {
            return Err(VariableError::VariableNotFound {
                name: input.name.clone(),
            });
        }

        info!(
            application_id = %application_id,
            name = %input.name,
            kind = %input.kind,
            "variable updated"
        );
        Ok(UpdateOutcome::Updated)
    }

    /// Delete one variable by name.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::VariableNotFound`] if no row matched.
    pub async fn delete(&self, scope: &ApplicationScope, name: &str) -> Result<(), VariableError> {
        let application_id = self.resolve(scope).await?;
        let removed = self.backend.delete_variable(application_id, name).await?;
        if removed == 0 {
            return Err(VariableError::VariableNotFound {
                name: name.to_owned(),
            });
        }

        info!(application_id = %application_id, name = %name, "variable deleted");
        Ok(())
    }

    /// Delete every variable of the application. Succeeds on an empty
    /// collection and always bumps `last_modified`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::Storage`] on backend failure.
    pub async fn delete_all(&self, scope: &ApplicationScope) -> Result<u64, VariableError> {
        let application_id = self.resolve(scope).await?;
        let removed = self.backend.delete_all_variables(application_id).await?;

        info!(application_id = %application_id, removed, "all variables deleted");
        Ok(removed)
    }

    fn seal(&self, input: &VariableInput) -> Result<VariableWrite, VariableError> {
        let sealed = self.codec.encrypt(input.kind, &input.value)?;
        Ok(VariableWrite {
            name: input.name.clone(),
            clear_value: sealed.clear,
            cipher_value: sealed.cipher,
            var_type: input.kind.as_str().to_owned(),
        })
    }

    fn present(&self, row: VariableRow, mode: ReadMode) -> Result<Variable, VariableError> {
        let kind: VariableType = row.var_type.parse()?;
        let value = placeholder::render(
            self.codec.as_ref(),
            kind,
            row.clear_value.as_deref(),
            &row.cipher_value,
            mode,
        )?;
        Ok(Variable {
            id: row.id,
            name: row.name,
            value,
            kind,
        })
    }
}
