//! Rendering of tool and chat results for the terminal and the HTTP API.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{ChatError, ParseError, ToolError};
use crate::intent::{Syntax, USAGE};
use crate::models::ErrorPayload;
use crate::router::RoutedResponse;

/// Pretty JSON of a tool result.
pub fn tool_text<T: Serialize>(output: &T) -> String {
    // ---
    serde_json::to_string_pretty(output).unwrap_or_else(|e| {
        serde_json::json!({ "error": format!("cannot serialize tool output: {e}") }).to_string()
    })
}

/// Annotation naming the failing tool and its cause.
pub fn tool_error(label: &str, err: &ToolError) -> String {
    format!("[tool error] {label}: {err}")
}

/// User-facing text for malformed input.
pub fn parse_failure(syntax: Syntax, err: &ParseError) -> String {
    // ---
    match syntax {
        Syntax::Command => format!("Error: {err}\n{USAGE}"),
        Syntax::Pattern | Syntax::Directive => format!("[parse error] {err}"),
    }
}

pub fn chat_error(err: &ChatError) -> String {
    format!("[chat error] {err}")
}

// --- HTTP

/// HTTP status for a failed tool call.
pub fn tool_error_status(err: &ToolError) -> StatusCode {
    // ---
    match err {
        ToolError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ToolError::NotFound(_) => StatusCode::NOT_FOUND,
        ToolError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ToolError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorPayload::new(message))).into_response()
}

pub fn json_tool_error(err: &ToolError) -> Response {
    json_error(tool_error_status(err), err.to_string())
}

/// Plain-text body for `POST /api/chat`.
pub fn chat_response(routed: RoutedResponse) -> Response {
    // ---
    let status = match routed {
        RoutedResponse::ChatFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RoutedResponse::ToolResult(_) | RoutedResponse::ChatResult(_) => StatusCode::OK,
    };
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        routed.into_text(),
    )
        .into_response()
}
