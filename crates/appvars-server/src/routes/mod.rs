//! HTTP route handlers.
//!
//! Variable and audit routes are nested under
//! `/v1/projects/{project_key}/applications/{app_name}/variables` and run
//! behind [`caller_middleware`]. `/v1/health` is unauthenticated.

pub mod audit;
pub mod variables;

use std::sync::Arc;

use axum::http::{HeaderValue, header};
use axum::middleware as axum_mw;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::caller_middleware;
use crate::state::AppState;

/// Requests served concurrently before new ones wait for a slot.
const MAX_IN_FLIGHT: usize = 512;

/// Longest variable name accepted.
const MAX_NAME_LEN: usize = 128;

/// Build the complete application router.
pub fn app(state: Arc<AppState>) -> Router {
    let projects = Router::new()
        .merge(variables::router())
        .merge(audit::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            caller_middleware,
        ));

    Router::new()
        .route("/v1/health", get(health))
        .nest("/v1/projects", projects)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// `GET /v1/health`
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Validate a variable name.
///
/// - Must not be empty or longer than 128 bytes.
/// - Only alphanumeric, `_`, `-`, `.` characters allowed.
/// - `audit` is reserved for the snapshot routes.
pub(crate) fn validate_variable_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "variable name must not be empty".to_owned(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "variable name exceeds {MAX_NAME_LEN} bytes"
        )));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(AppError::BadRequest(
            "variable name may only contain alphanumeric characters, '_', '-', and '.'".to_owned(),
        ));
    }

    if name == "audit" {
        return Err(AppError::BadRequest(
            "variable name 'audit' is reserved".to_owned(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in ["DB_PASS", "ENV", "api.url", "feature-flag-2"] {
            assert!(validate_variable_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_bad_names() {
        let too_long = "x".repeat(MAX_NAME_LEN + 1);
        for name in ["", "a b", "../etc", "name/with/slash", "audit", too_long.as_str()] {
            assert!(
                matches!(validate_variable_name(name), Err(AppError::BadRequest(_))),
                "{name}"
            );
        }
    }
}
