//! `POST /api/chat`: the full tool router behind a plain-text reply.

use axum::{extract::State, http::StatusCode, response::Response, routing::post, Json, Router};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::present;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/api/chat", post(chat))
}

async fn chat(State(router): State<AppState>, Json(body): Json<ChatRequest>) -> Response {
    // ---
    let message = body.message.trim();
    if message.is_empty() {
        return present::json_error(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    info!("POST /api/chat ({} chars)", message.len());
    present::chat_response(router.route(message).await)
}
