//! Shared application state for the `AppVars` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use appvars_core::{AuditTrail, SecretCodec, VariableStore};
use appvars_storage::StorageBackend;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Variable CRUD.
    pub store: VariableStore,
    /// Snapshot recording and history.
    pub audit: AuditTrail,
    /// Bearer token that marks a caller as privileged.
    pub admin_token: Option<String>,
}

impl AppState {
    /// Wire a store and audit trail over `backend` and `codec`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        codec: Arc<dyn SecretCodec>,
        admin_token: Option<String>,
    ) -> Self {
        let store = VariableStore::new(backend, codec);
        let audit = AuditTrail::new(store.clone());
        Self {
            store,
            audit,
            admin_token,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
