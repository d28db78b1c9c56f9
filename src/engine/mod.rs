//! Query backends: the opaque "execute SQL, return rows" capability.
//!
//! Backends receive a fully rendered [`Statement`] (placeholders already in
//! their dialect) plus typed parameters, and return rows of [`SqlValue`]s.
//! Value normalization to plain numbers and ISO-8601 strings lives here so
//! every backend produces the same JSON-safe forms.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};

use crate::config::{Backend, Config};
use crate::error::EngineError;

mod postgres;
mod trino;

pub use postgres::PgEngine;
pub use trino::TrinoEngine;

// ---

/// SQL flavour a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Trino,
    Postgres,
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Timestamp(NaiveDateTime),
}

/// SQL text with dialect placeholders and the values bound to them, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// A single cell as returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric carried as text to avoid precision loss on the wire.
    Decimal(String),
    Text(String),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

pub type Row = Vec<SqlValue>;

impl SqlValue {
    // ---
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Decimal(s) | Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Non-negative row count view of the value.
    pub fn as_count(&self) -> u64 {
        match self {
            Self::Int(v) => (*v).max(0) as u64,
            other => other.as_f64().map(|v| v.max(0.0) as u64).unwrap_or(0),
        }
    }

    /// Plain text view; numbers are rendered in decimal form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Decimal(s) | Self::Text(s) => Some(s.clone()),
            Self::Timestamp(_) | Self::TimestampTz(_) => self.to_iso8601(),
        }
    }

    /// ISO-8601 rendering of timestamp values.
    pub fn to_iso8601(&self) -> Option<String> {
        match self {
            Self::Timestamp(ts) => Some(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::TimestampTz(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Cell `idx` of `row`, treating a short row as nulls.
pub fn cell(row: &Row, idx: usize) -> &SqlValue {
    row.get(idx).unwrap_or(&SqlValue::Null)
}

// ---

/// Asynchronous query capability.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, EngineError>;
}

/// A backend whose driver blocks the calling thread.
pub trait BlockingQueryEngine: Send + Sync + 'static {
    fn dialect(&self) -> Dialect;

    fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>>;
}

/// Runs a [`BlockingQueryEngine`] on the tokio blocking pool so slow round
/// trips never stall request-handling threads.
pub struct Blocking<E>(Arc<E>);

impl<E: BlockingQueryEngine> Blocking<E> {
    pub fn new(engine: E) -> Self {
        Self(Arc::new(engine))
    }
}

#[async_trait]
impl<E: BlockingQueryEngine> QueryEngine for Blocking<E> {
    // ---
    fn dialect(&self) -> Dialect {
        self.0.dialect()
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, EngineError> {
        // ---
        let engine = Arc::clone(&self.0);
        let statement = statement.clone();
        let rows = tokio::task::spawn_blocking(move || engine.fetch_all(&statement)).await??;
        Ok(rows)
    }
}

/// Build the backend selected by the configuration.
pub fn connect(cfg: &Config) -> Result<Arc<dyn QueryEngine>> {
    // ---
    match &cfg.backend {
        Backend::Trino(trino) => {
            let engine = TrinoEngine::new(trino, &cfg.tables)?;
            tracing::info!("Using Trino backend at {}", engine.base_url());
            Ok(Arc::new(engine))
        }
        Backend::Postgres { db_url, pool_max } => {
            let engine = PgEngine::connect(db_url, *pool_max)?;
            Ok(Arc::new(engine))
        }
    }
}
