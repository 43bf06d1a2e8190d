//! Variable audit routes.
//!
//! Listing is open to every caller and always redacted. Fetching a single
//! snapshot decodes its secrets, so it requires a privileged caller.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;

use appvars_core::{ApplicationScope, VariableAudit};

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

/// Build the audit router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/{project_key}/applications/{app_name}/variables/audit",
            get(list_audits),
        )
        .route(
            "/{project_key}/applications/{app_name}/variables/audit/{audit_id}",
            get(get_audit),
        )
}

/// `GET .../variables/audit`
///
/// Every snapshot of the application, newest first, secrets redacted.
async fn list_audits(
    State(state): State<Arc<AppState>>,
    Path((project_key, app_name)): Path<(String, String)>,
) -> Result<Json<Vec<VariableAudit>>, AppError> {
    let scope = ApplicationScope::named(project_key, app_name);
    let audits = state.audit.list(&scope).await?;
    Ok(Json(audits))
}

/// `GET .../variables/audit/{audit_id}`
async fn get_audit(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((project_key, app_name, audit_id)): Path<(String, String, Uuid)>,
) -> Result<Json<VariableAudit>, AppError> {
    if !caller.privileged {
        return Err(AppError::Forbidden(
            "reading a snapshot requires a privileged caller".to_owned(),
        ));
    }

    let scope = ApplicationScope::named(project_key, app_name);
    let audit = state.audit.retrieve(&scope, audit_id).await?;
    Ok(Json(audit))
}
