//! HTTP API gateway.
//!
//! Each sibling module exports a subrouter; this gateway merges them, adds
//! request tracing and attaches the shared [`ToolRouter`] state.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::ToolRouter;

mod chat;
mod health;
mod sensors;

/// State shared by every handler.
pub type AppState = Arc<ToolRouter>;

// ---

pub fn router(tool_router: AppState) -> Router {
    // ---
    Router::new()
        .merge(health::router())
        .merge(sensors::router())
        .merge(chat::router())
        .layer(TraceLayer::new_for_http())
        .with_state(tool_router)
}
