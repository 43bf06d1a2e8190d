//! In-memory storage backend for testing and local development.
//!
//! All tables live in one struct behind a single `RwLock`, so every mutation
//! and its `last_modified` bump happen under the same write guard. Nothing is
//! persisted; all data is lost when the process exits.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    ApplicationScope, AuditRow, StorageBackend, StorageError, VariableRow, VariableWrite,
};

/// Constraint name reported for duplicate variable names, matching the
/// name PostgreSQL generates for `UNIQUE (application_id, var_name)`.
const VARIABLE_NAME_CONSTRAINT: &str = "variable_application_id_var_name_key";

#[derive(Debug)]
struct ApplicationRecord {
    project_key: String,
    name: String,
    last_modified: DateTime<Utc>,
    variables: BTreeMap<String, VariableRow>,
}

impl ApplicationRecord {
    /// Advance `last_modified`. The timestamp strictly increases even when
    /// two bumps land within the clock's resolution.
    fn touch(&mut self) {
        let now = Utc::now();
        self.last_modified = if now > self.last_modified {
            now
        } else {
            self.last_modified + TimeDelta::microseconds(1)
        };
    }
}

#[derive(Debug, Default)]
struct Tables {
    applications: BTreeMap<Uuid, ApplicationRecord>,
    audits: Vec<AuditRow>,
}

/// An in-memory storage backend.
///
/// Cloning is cheap and clones share the same tables.
///
/// # Examples
///
/// ```
/// # use appvars_storage::{ApplicationScope, MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// let app_id = backend.create_application("PROJ", "api").await;
/// let resolved = backend
///     .resolve_application(&ApplicationScope::named("PROJ", "api"))
///     .await
///     .unwrap();
/// assert_eq!(resolved, Some(app_id));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application and return its identifier.
    ///
    /// Applications are owned by the surrounding service; this exists so
    /// tests and the development server have something to attach variables to.
    /// `(project_key, name)` is unique: registering a pair twice returns the
    /// identifier of the first registration.
    pub async fn create_application(&self, project_key: &str, name: &str) -> Uuid {
        let mut tables = self.tables.write().await;
        if let Some((id, _)) = tables
            .applications
            .iter()
            .find(|(_, app)| app.project_key == project_key && app.name == name)
        {
            return *id;
        }

        let id = Uuid::new_v4();
        tables.applications.insert(
            id,
            ApplicationRecord {
                project_key: project_key.to_owned(),
                name: name.to_owned(),
                last_modified: Utc::now(),
                variables: BTreeMap::new(),
            },
        );
        id
    }
}

fn missing_application(operation: &str, application_id: Uuid) -> StorageError {
    StorageError::Query {
        operation: operation.to_owned(),
        reason: format!("application {application_id} does not exist"),
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn resolve_application(
        &self,
        scope: &ApplicationScope,
    ) -> Result<Option<Uuid>, StorageError> {
        let tables = self.tables.read().await;
        let found = match scope {
            ApplicationScope::Id(id) => tables.applications.contains_key(id).then_some(*id),
            ApplicationScope::Name {
                project_key,
                application,
            } => tables
                .applications
                .iter()
                .find(|(_, app)| app.project_key == *project_key && app.name == *application)
                .map(|(id, _)| *id),
        };
        Ok(found)
    }

    async fn last_modified(
        &self,
        application_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .applications
            .get(&application_id)
            .map(|app| app.last_modified))
    }

    async fn list_variables(&self, application_id: Uuid) -> Result<Vec<VariableRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .applications
            .get(&application_id)
            .map(|app| app.variables.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_variable(
        &self,
        application_id: Uuid,
        name: &str,
    ) -> Result<Option<VariableRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .applications
            .get(&application_id)
            .and_then(|app| app.variables.get(name).cloned()))
    }

    async fn insert_variable(
        &self,
        application_id: Uuid,
        row: &VariableWrite,
    ) -> Result<VariableRow, StorageError> {
        let mut tables = self.tables.write().await;
        let app = tables
            .applications
            .get_mut(&application_id)
            .ok_or_else(|| missing_application("insert variable", application_id))?;

        if app.variables.contains_key(&row.name) {
            return Err(StorageError::UniqueViolation {
                constraint: VARIABLE_NAME_CONSTRAINT.to_owned(),
            });
        }

        let stored = VariableRow {
            id: Uuid::new_v4(),
            name: row.name.clone(),
            clear_value: row.clear_value.clone(),
            cipher_value: row.cipher_value.clone(),
            var_type: row.var_type.clone(),
        };
        app.variables.insert(row.name.clone(), stored.clone());
        app.touch();
        Ok(stored)
    }

    async fn update_variable(
        &self,
        application_id: Uuid,
        row: &VariableWrite,
    ) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(app) = tables.applications.get_mut(&application_id) else {
            return Ok(0);
        };
        let Some(existing) = app.variables.get_mut(&row.name) else {
            return Ok(0);
        };

        existing.clear_value.clone_from(&row.clear_value);
        existing.cipher_value.clone_from(&row.cipher_value);
        existing.var_type.clone_from(&row.var_type);
        app.touch();
        Ok(1)
    }

    async fn delete_variable(&self, application_id: Uuid, name: &str) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(app) = tables.applications.get_mut(&application_id) else {
            return Ok(0);
        };
        if app.variables.remove(name).is_none() {
            return Ok(0);
        }
        app.touch();
        Ok(1)
    }

    async fn delete_all_variables(&self, application_id: Uuid) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(app) = tables.applications.get_mut(&application_id) else {
            return Ok(0);
        };
        let removed = u64::try_from(app.variables.len()).unwrap_or(u64::MAX);
        app.variables.clear();
        app.touch();
        Ok(removed)
    }

    async fn insert_audit(
        &self,
        application_id: Uuid,
        author: &str,
        data: &str,
    ) -> Result<AuditRow, StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.applications.contains_key(&application_id) {
            return Err(missing_application("insert audit", application_id));
        }

        let row = AuditRow {
            id: Uuid::new_v4(),
            application_id,
            versioned: Utc::now(),
            data: data.to_owned(),
            author: author.to_owned(),
        };
        tables.audits.push(row.clone());
        Ok(row)
    }

    async fn get_audit(
        &self,
        application_id: Uuid,
        audit_id: Uuid,
    ) -> Result<Option<AuditRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .audits
            .iter()
            .find(|a| a.id == audit_id && a.application_id == application_id)
            .cloned())
    }

    async fn list_audits(&self, application_id: Uuid) -> Result<Vec<AuditRow>, StorageError> {
        let tables = self.tables.read().await;
        // Insertion order is chronological; reverse it, then a stable sort
        // keeps same-timestamp rows newest first.
        let mut audits: Vec<AuditRow> = tables
            .audits
            .iter()
            .rev()
            .filter(|a| a.application_id == application_id)
            .cloned()
            .collect();
        audits.sort_by(|a, b| b.versioned.cmp(&a.versioned));
        Ok(audits)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write(name: &str, value: &str) -> VariableWrite {
        VariableWrite {
            name: name.to_owned(),
            clear_value: Some(value.to_owned()),
            cipher_value: Vec::new(),
            var_type: "string".to_owned(),
        }
    }

    #[tokio::test]
    async fn resolve_by_id_and_name() {
        let backend = MemoryBackend::new();
        let id = backend.create_application("PROJ", "api").await;

        assert_eq!(
            backend.resolve_application(&ApplicationScope::Id(id)).await.unwrap(),
            Some(id)
        );
        assert_eq!(
            backend
                .resolve_application(&ApplicationScope::named("PROJ", "api"))
                .await
                .unwrap(),
            Some(id)
        );
        assert_eq!(
            backend
                .resolve_application(&ApplicationScope::named("OTHER", "api"))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            backend
                .resolve_application(&ApplicationScope::Id(Uuid::new_v4()))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn registering_an_application_twice_keeps_one() {
        let backend = MemoryBackend::new();
        let first = backend.create_application("PROJ", "api").await;
        backend.insert_variable(first, &write("ENV", "prod")).await.unwrap();

        let second = backend.create_application("PROJ", "api").await;
        assert_eq!(second, first);
        assert_eq!(backend.list_variables(first).await.unwrap().len(), 1);
        assert_ne!(backend.create_application("PROJ", "worker").await, first);
    }

    #[tokio::test]
    async fn list_is_ordered_by_name() {
        let backend = MemoryBackend::new();
        let id = backend.create_application("PROJ", "api").await;
        backend.insert_variable(id, &write("ZETA", "z")).await.unwrap();
        backend.insert_variable(id, &write("ALPHA", "a")).await.unwrap();

        let names: Vec<String> = backend
            .list_variables(id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["ALPHA", "ZETA"]);
    }

    #[tokio::test]
    async fn duplicate_insert_is_unique_violation() {
        let backend = MemoryBackend::new();
        let id = backend.create_application("PROJ", "api").await;
        backend.insert_variable(id, &write("ENV", "prod")).await.unwrap();

        let err = backend
            .insert_variable(id, &write("ENV", "dev"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        let kept = backend.get_variable(id, "ENV").await.unwrap().unwrap();
        assert_eq!(kept.clear_value.as_deref(), Some("prod"));
    }

    #[tokio::test]
    async fn same_name_in_two_applications_is_allowed() {
        let backend = MemoryBackend::new();
        let a = backend.create_application("PROJ", "a").await;
        let b = backend.create_application("PROJ", "b").await;
        backend.insert_variable(a, &write("ENV", "x")).await.unwrap();
        backend.insert_variable(b, &write("ENV", "y")).await.unwrap();
    }

    #[tokio::test]
    async fn update_missing_changes_nothing() {
        let backend = MemoryBackend::new();
        let id = backend.create_application("PROJ", "api").await;
        let before = backend.last_modified(id).await.unwrap();

        let changed = backend.update_variable(id, &write("NOPE", "x")).await.unwrap();
        assert_eq!(changed, 0);
        assert_eq!(backend.last_modified(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn delete_all_bumps_even_when_empty() {
        let backend = MemoryBackend::new();
        let id = backend.create_application("PROJ", "api").await;
        let before = backend.last_modified(id).await.unwrap().unwrap();

        let removed = backend.delete_all_variables(id).await.unwrap();
        assert_eq!(removed, 0);
        let after = backend.last_modified(id).await.unwrap().unwrap();
        assert!(after > before);
    }

    #[tokio::test]
    async fn audits_are_scoped_and_newest_first() {
        let backend = MemoryBackend::new();
        let a = backend.create_application("PROJ", "a").await;
        let b = backend.create_application("PROJ", "b").await;

        let first = backend.insert_audit(a, "alice", "[]").await.unwrap();
        let second = backend.insert_audit(a, "bob", "[]").await.unwrap();
        let other = backend.insert_audit(b, "carol", "[]").await.unwrap();

        let ids: Vec<Uuid> = backend
            .list_audits(a)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);

        assert!(backend.get_audit(a, other.id).await.unwrap().is_none());
        assert!(backend.get_audit(b, other.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn audit_for_unknown_application_fails() {
        let backend = MemoryBackend::new();
        let result = backend.insert_audit(Uuid::new_v4(), "alice", "[]").await;
        assert!(matches!(result, Err(StorageError::Query { .. })));
    }
}
