//! Variable routes: `/v1/projects/{project_key}/applications/{app_name}/variables`
//!
//! Every mutating handler records an audit snapshot of the current
//! collection before it writes, so history always holds the state a change
//! replaced. A single-variable update carrying the redaction placeholder
//! for a secret is a no-op and records nothing.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use appvars_core::placeholder::is_unchanged_secret;
use appvars_core::{
    ApplicationScope, ReadMode, UpdateOutcome, Variable, VariableInput, VariableType,
};

use super::validate_variable_name;
use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

/// Build the variables router.
///
/// Paths (relative to `/v1/projects`):
/// - `GET    /{project_key}/applications/{app_name}/variables`: list
/// - `PUT    /{project_key}/applications/{app_name}/variables`: batch update
/// - `DELETE /{project_key}/applications/{app_name}/variables`: delete all
/// - `GET    /{project_key}/applications/{app_name}/variables/{name}`: load
/// - `POST   /{project_key}/applications/{app_name}/variables/{name}`: insert
/// - `PUT    /{project_key}/applications/{app_name}/variables/{name}`: update
/// - `DELETE /{project_key}/applications/{app_name}/variables/{name}`: delete
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/{project_key}/applications/{app_name}/variables",
            get(list_variables)
                .put(update_variables)
                .delete(delete_all_variables),
        )
        .route(
            "/{project_key}/applications/{app_name}/variables/{name}",
            get(get_variable)
                .post(create_variable)
                .put(update_variable)
                .delete(delete_variable),
        )
}

// ── Request / response types ─────────────────────────────────────────

/// Query parameters for variable listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub mode: ReadMode,
}

/// Request body for inserting or updating one variable. The name comes
/// from the path.
#[derive(Deserialize)]
pub struct VariableBody {
    #[serde(rename = "type")]
    pub kind: VariableType,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<Variable>,
}

#[derive(Debug, Serialize)]
pub struct BatchUpdateResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteAllResponse {
    pub deleted: u64,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// `GET .../variables?mode=redacted|encrypted|plaintext`
///
/// Only the redacted mode is open to every caller.
async fn list_variables(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((project_key, app_name)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Variable>>, AppError> {
    if query.mode != ReadMode::Redacted && !caller.privileged {
        return Err(AppError::Forbidden(
            "plaintext and encrypted listings require a privileged caller".to_owned(),
        ));
    }

    let scope = ApplicationScope::named(project_key, app_name);
    let variables = state.store.list(&scope, query.mode).await?;
    Ok(Json(variables))
}

/// `GET .../variables/{name}`
async fn get_variable(
    State(state): State<Arc<AppState>>,
    Path((project_key, app_name, name)): Path<(String, String, String)>,
) -> Result<Json<Variable>, AppError> {
    let scope = ApplicationScope::named(project_key, app_name);
    let variable = state.store.load(&scope, &name).await?;
    Ok(Json(variable))
}

/// `POST .../variables/{name}`
async fn create_variable(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((project_key, app_name, name)): Path<(String, String, String)>,
    Json(body): Json<VariableBody>,
) -> Result<(StatusCode, Json<Variable>), AppError> {
    validate_variable_name(&name)?;
    let scope = ApplicationScope::named(project_key, app_name);

    state.audit.record(&scope, &caller.author).await?;
    let variable = state
        .store
        .insert(&scope, &VariableInput::new(name, body.kind, body.value))
        .await?;

    Ok((StatusCode::CREATED, Json(variable)))
}

/// `PUT .../variables/{name}`
async fn update_variable(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((project_key, app_name, name)): Path<(String, String, String)>,
    Json(body): Json<VariableBody>,
) -> Result<Json<UpdateResponse>, AppError> {
    validate_variable_name(&name)?;
    if is_unchanged_secret(body.kind, &body.value) {
        return Ok(Json(UpdateResponse {
            updated: false,
            variable: None,
        }));
    }
    let scope = ApplicationScope::named(project_key, app_name);

    state.audit.record(&scope, &caller.author).await?;
    let outcome = state
        .store
        .update(&scope, &VariableInput::new(name.clone(), body.kind, body.value))
        .await?;
    let variable = state.store.load(&scope, &name).await?;

    Ok(Json(UpdateResponse {
        updated: outcome == UpdateOutcome::Updated,
        variable: Some(variable),
    }))
}

/// `PUT .../variables`
///
/// Overwrites every listed variable. Entries still holding the redaction
/// placeholder for a secret are left untouched.
async fn update_variables(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((project_key, app_name)): Path<(String, String)>,
    Json(inputs): Json<Vec<VariableInput>>,
) -> Result<Json<BatchUpdateResponse>, AppError> {
    for input in &inputs {
        validate_variable_name(&input.name)?;
    }
    let scope = ApplicationScope::named(project_key, app_name);

    state.audit.record(&scope, &caller.author).await?;
    let updated = state.store.update_many(&scope, &inputs).await?;

    Ok(Json(BatchUpdateResponse { updated }))
}

/// `DELETE .../variables/{name}`
async fn delete_variable(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((project_key, app_name, name)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    let scope = ApplicationScope::named(project_key, app_name);

    state.audit.record(&scope, &caller.author).await?;
    state.store.delete(&scope, &name).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE .../variables`
async fn delete_all_variables(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((project_key, app_name)): Path<(String, String)>,
) -> Result<Json<DeleteAllResponse>, AppError> {
    let scope = ApplicationScope::named(project_key, app_name);

    state.audit.record(&scope, &caller.author).await?;
    let deleted = state.store.delete_all(&scope).await?;

    Ok(Json(DeleteAllResponse { deleted }))
}
