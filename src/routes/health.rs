// src/routes/health.rs
//! Liveness endpoint.
//!
//! `GET /api/health` answers without touching the query backend or the
//! language model, so it stays cheap enough for container health checks.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/api/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// Create a subrouter containing the `/api/health` route.
///
/// Generic over the application state so it merges into the gateway router
/// regardless of the state type.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/api/health", get(health))
}
