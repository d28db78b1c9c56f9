//! Error taxonomy for the agent.
//!
//! Parse and tool errors are always recovered at the router boundary and turned
//! into user-facing text or `{error}` JSON. Configuration errors are reported
//! through `anyhow` from `config.rs` and are the only fatal class.

use std::time::Duration;

use thiserror::Error;

/// Malformed user input: command syntax, windows, timestamps, identifiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no arguments given")]
    NoArguments,

    #[error("missing required argument `sensor_id`")]
    MissingSensorId,

    #[error("invalid window '{0}' (expected <n><unit>, e.g. 15m or 24h)")]
    InvalidWindow(String),

    #[error("unrecognized window unit '{unit}' in '{window}' (expected s, m, h or d)")]
    UnknownWindowUnit { window: String, unit: String },

    #[error("invalid timestamp '{0}' (expected ISO-8601, e.g. 2024-05-01T12:00:00Z)")]
    InvalidTimestamp(String),

    #[error("invalid value for `{key}`: '{value}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("invalid table identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Failures raised by a query backend.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{name}: {message}")]
    Query { name: String, message: String },

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("cannot decode column `{column}`: {reason}")]
    Decode { column: String, reason: String },

    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures of a single tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("sensor '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    InvalidRequest(#[from] ParseError),
}

/// Failures talking to the language model endpoint.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion: {0}")]
    Malformed(String),
}
