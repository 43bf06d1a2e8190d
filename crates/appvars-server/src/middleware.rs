//! Caller identification middleware.
//!
//! Every request under `/v1/projects` gets a [`Caller`] extension. A bearer
//! token equal to the configured admin token makes the caller privileged;
//! anything else, including no token at all, is an ordinary caller.
//! `X-AppVars-Author` names the author recorded on audit snapshots.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Header naming the author of a mutation.
pub const AUTHOR_HEADER: &str = "x-appvars-author";

/// Author recorded when the request names none.
pub const ANONYMOUS_AUTHOR: &str = "anonymous";

/// Longest author string accepted from the header.
const MAX_AUTHOR_LEN: usize = 256;

/// Identity of the current caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Author string stored on audit snapshots.
    pub author: String,
    /// Whether the caller may read plaintext values and decoded snapshots.
    pub privileged: bool,
}

/// Axum middleware that injects a [`Caller`] into request extensions.
pub async fn caller_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let caller = identify(req.headers(), state.admin_token.as_deref());
    req.extensions_mut().insert(caller);
    next.run(req).await
}

fn identify(headers: &HeaderMap, admin_token: Option<&str>) -> Caller {
    let privileged = match (bearer_token(headers), admin_token) {
        (Some(presented), Some(expected)) => constant_time_eq(presented, expected),
        _ => false,
    };

    let author = headers
        .get(AUTHOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_AUTHOR_LEN)
        .unwrap_or(ANONYMOUS_AUTHOR)
        .to_owned();

    Caller { author, privileged }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
