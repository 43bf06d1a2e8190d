//! Variable audit trail.
//!
//! A snapshot is the full variable collection of an application at the
//! moment it was recorded, serialized as one JSON block. Secret values are
//! kept as base64 encrypted tokens inside the block, so a stored snapshot
//! never holds plaintext.

use appvars_storage::{ApplicationScope, AuditRow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::VariableError;
use crate::placeholder::{self, PASSWORD_PLACEHOLDER, ReadMode};
use crate::store::VariableStore;
use crate::variable::Variable;

/// One recorded snapshot as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableAudit {
    pub id: Uuid,
    pub versioned: DateTime<Utc>,
    pub author: String,
    pub variables: Vec<Variable>,
}

/// Records and reads back snapshots of an application's variables.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    store: VariableStore,
}

impl AuditTrail {
    #[must_use]
    pub fn new(store: VariableStore) -> Self {
        Self { store }
    }

    /// Snapshot the current collection and store it under `author`.
    ///
    /// Returns the id of the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::ApplicationNotFound`] for an unknown scope,
    /// [`VariableError::Serialization`] if the snapshot cannot be encoded, and
    /// the store's error if the collection cannot be loaded.
    pub async fn record(
        &self,
        scope: &ApplicationScope,
        author: &str,
    ) -> Result<Uuid, VariableError> {
        let application_id = self.store.resolve(scope).await?;
        let variables = self
            .store
            .list_resolved(application_id, ReadMode::EncryptedToken)
            .await?;

        let data = serde_json::to_string(&variables).map_err(|e| VariableError::Serialization {
            reason: e.to_string(),
        })?;

        let row = self
            .store
            .backend()
            .insert_audit(application_id, author, &data)
            .await?;

        info!(
            application_id = %application_id,
            audit_id = %row.id,
            author = %author,
            count = variables.len(),
            "variable audit recorded"
        );
        Ok(row.id)
    }

    /// Fetch one snapshot with every secret decrypted back to plaintext.
    ///
    /// Privileged callers only.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::AuditNotFound`] if no snapshot with this id
    /// belongs to the application, and [`VariableError::Codec`] if a stored
    /// token is malformed or cannot be decrypted.
    pub async fn retrieve(
        &self,
        scope: &ApplicationScope,
        audit_id: Uuid,
    ) -> Result<VariableAudit, VariableError> {
        let application_id = self.store.resolve(scope).await?;
        let row = self
            .store
            .backend()
            .get_audit(application_id, audit_id)
            .await?
            .ok_or(VariableError::AuditNotFound { id: audit_id })?;

        let mut audit = decode_row(row)?;
        for variable in audit.variables.iter_mut().filter(|v| v.kind.is_secret()) {
            let cipher = placeholder::decode_token(&variable.value)?;
            variable.value = self
                .store
                .codec()
                .decrypt(variable.kind, None, &cipher, true)?;
        }
        Ok(audit)
    }

    /// List every snapshot of the application, newest first, with secret
    /// values replaced by the placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::Serialization`] if a stored block cannot be
    /// decoded.
    pub async fn list(&self, scope: &ApplicationScope) -> Result<Vec<VariableAudit>, VariableError> {
        let application_id = self.store.resolve(scope).await?;
        let rows = self.store.backend().list_audits(application_id).await?;

        rows.into_iter()
            .map(|row| {
                let mut audit = decode_row(row)?;
                for variable in audit.variables.iter_mut().filter(|v| v.kind.is_secret()) {
                    PASSWORD_PLACEHOLDER.clone_into(&mut variable.value);
                }
                Ok(audit)
            })
            .collect()
    }
}

fn decode_row(row: AuditRow) -> Result<VariableAudit, VariableError> {
    let variables: Vec<Variable> =
        serde_json::from_str(&row.data).map_err(|e| VariableError::Serialization {
            reason: e.to_string(),
        })?;
    Ok(VariableAudit {
        id: row.id,
        versioned: row.versioned,
        author: row.author,
        variables,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::AesGcmCodec;
    use crate::crypto::EncryptionKey;
    use crate::error::CodecError;
    use crate::variable::{VariableInput, VariableType};
    use appvars_storage::{MemoryBackend, StorageBackend};

    async fn setup() -> (AuditTrail, VariableStore, MemoryBackend, ApplicationScope) {
        let backend = MemoryBackend::new();
        backend.create_application("PROJ", "api").await;
        let codec = AesGcmCodec::derive(&EncryptionKey::generate()).unwrap();
        let store = VariableStore::new(Arc::new(backend.clone()), Arc::new(codec));
        let scope = ApplicationScope::named("PROJ", "api");

        store
            .insert(&scope, &VariableInput::new("DB_PASS", VariableType::Password, "s3cr3t"))
            .await
            .unwrap();
        store
            .insert(&scope, &VariableInput::new("ENV", VariableType::String, "prod"))
            .await
            .unwrap();

        (AuditTrail::new(store.clone()), store, backend, scope)
    }

    #[tokio::test]
    async fn record_then_retrieve_restores_plaintext() {
        let (trail, _, _, scope) = setup().await;
        let id = trail.record(&scope, "alice").await.unwrap();

        let audit = trail.retrieve(&scope, id).await.unwrap();
        assert_eq!(audit.author, "alice");
        let pairs: Vec<(&str, &str)> = audit
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("DB_PASS", "s3cr3t"), ("ENV", "prod")]);
    }

    #[tokio::test]
    async fn snapshot_reflects_state_at_record_time() {
        let (trail, store, _, scope) = setup().await;
        let id = trail.record(&scope, "alice").await.unwrap();

        store
            .update(&scope, &VariableInput::new("DB_PASS", VariableType::Password, "rotated"))
            .await
            .unwrap();

        let audit = trail.retrieve(&scope, id).await.unwrap();
        let secret = audit.variables.iter().find(|v| v.name == "DB_PASS").unwrap();
        assert_eq!(secret.value, "s3cr3t");
    }

    #[tokio::test]
    async fn stored_block_holds_no_plaintext_secret() {
        let (trail, _, backend, scope) = setup().await;
        let id = trail.record(&scope, "alice").await.unwrap();

        let app_id = backend.resolve_application(&scope).await.unwrap().unwrap();
        let row = backend.get_audit(app_id, id).await.unwrap().unwrap();
        assert!(!row.data.contains("s3cr3t"));
        assert!(row.data.contains("prod"));
    }

    #[tokio::test]
    async fn list_redacts_secrets_newest_first() {
        let (trail, _, _, scope) = setup().await;
        let first = trail.record(&scope, "alice").await.unwrap();
        let second = trail.record(&scope, "bob").await.unwrap();

        let audits = trail.list(&scope).await.unwrap();
        let ids: Vec<Uuid> = audits.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second, first]);

        for audit in &audits {
            let secret = audit.variables.iter().find(|v| v.name == "DB_PASS").unwrap();
            assert_eq!(secret.value, PASSWORD_PLACEHOLDER);
            let plain = audit.variables.iter().find(|v| v.name == "ENV").unwrap();
            assert_eq!(plain.value, "prod");
        }
    }

    #[tokio::test]
    async fn list_without_snapshots_is_empty() {
        let (trail, _, _, scope) = setup().await;
        assert!(trail.list(&scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retrieve_unknown_id_is_not_found() {
        let (trail, _, _, scope) = setup().await;
        let missing = Uuid::new_v4();
        let err = trail.retrieve(&scope, missing).await.unwrap_err();
        assert!(matches!(err, VariableError::AuditNotFound { id } if id == missing));
    }

    #[tokio::test]
    async fn retrieve_is_scoped_to_the_owner() {
        let (trail, _, backend, scope) = setup().await;
        backend.create_application("PROJ", "worker").await;
        let id = trail.record(&scope, "alice").await.unwrap();

        let other = ApplicationScope::named("PROJ", "worker");
        let err = trail.retrieve(&other, id).await.unwrap_err();
        assert!(matches!(err, VariableError::AuditNotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_token_is_codec_error() {
        let (trail, _, backend, scope) = setup().await;
        let app_id = backend.resolve_application(&scope).await.unwrap().unwrap();
        let data = serde_json::json!([
            { "id": Uuid::nil(), "name": "DB_PASS", "value": "not base64!", "type": "password" }
        ])
        .to_string();
        let row = backend.insert_audit(app_id, "mallory", &data).await.unwrap();

        let err = trail.retrieve(&scope, row.id).await.unwrap_err();
        assert!(matches!(err, VariableError::Codec(CodecError::InvalidToken { .. })));
    }

    #[tokio::test]
    async fn undecodable_block_is_serialization_error() {
        let (trail, _, backend, scope) = setup().await;
        let app_id = backend.resolve_application(&scope).await.unwrap().unwrap();
        backend.insert_audit(app_id, "mallory", "{not json").await.unwrap();

        let err = trail.list(&scope).await.unwrap_err();
        assert!(matches!(err, VariableError::Serialization { .. }));
    }

    #[tokio::test]
    async fn record_empty_collection() {
        let (trail, store, _, scope) = setup().await;
        store.delete_all(&scope).await.unwrap();

        let id = trail.record(&scope, "alice").await.unwrap();
        assert!(trail.retrieve(&scope, id).await.unwrap().variables.is_empty());
    }
}
