//! Liveness and readiness endpoints.
//!
//! `GET /health`, `/live` and `/ready` report `200 {"ok":true}` while the
//! gateway is accepting or draining and `503 {"ok":false}` otherwise. They
//! are registered ahead of the route table; other methods on these paths
//! fall through to it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::lifecycle::Lifecycle;

/// Paths answered by [`health_check`].
pub const HEALTH_PATHS: [&str; 3] = ["/health", "/live", "/ready"];

#[derive(Debug, Serialize)]
struct HealthBody {
    ok: bool,
}

pub async fn health_check(State(lifecycle): State<Lifecycle>) -> Response {
    let ok = lifecycle.state().is_serving();
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthBody { ok })).into_response()
}
