//! Direct PostgreSQL / TimescaleDB backend on an `sqlx` pool.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row as _, TypeInfo};

use super::{Dialect, QueryEngine, Row, SqlParam, SqlValue, Statement};
use crate::error::EngineError;

// ---

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PgEngine {
    pool: PgPool,
}

impl PgEngine {
    // ---
    /// Build a lazily connected pool. Only a malformed URL fails here; an
    /// unreachable server surfaces per query as [`EngineError::Database`].
    pub fn connect(db_url: &str, pool_max: u32) -> Result<Self> {
        // ---
        let pool = PgPoolOptions::new()
            .max_connections(pool_max)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(db_url)
            .map_err(|e| anyhow::anyhow!("Invalid DATABASE_URL: {}", e))?;

        tracing::info!("Database pool ready (max {} connections)", pool_max);
        Ok(Self { pool })
    }
}

#[async_trait]
impl QueryEngine for PgEngine {
    // ---
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, EngineError> {
        // ---
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = match param {
                SqlParam::Text(v) => query.bind(v.clone()),
                SqlParam::Int(v) => query.bind(*v),
                SqlParam::Timestamp(v) => query.bind(*v),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &PgRow) -> Result<Row, EngineError> {
    (0..row.columns().len())
        .map(|idx| decode_value(row, idx))
        .collect()
}

/// How a column is read, by its Postgres type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Timestamp,
    TimestampTz,
    Text,
}

impl ColumnKind {
    /// `None` for types without a dedicated decoder, domains included.
    fn from_type_name(name: &str) -> Option<Self> {
        // ---
        let kind = match name.to_ascii_uppercase().as_str() {
            "BOOL" => Self::Bool,
            "INT2" => Self::Int2,
            "INT4" => Self::Int4,
            "INT8" => Self::Int8,
            "FLOAT4" => Self::Float4,
            "FLOAT8" => Self::Float8,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "SQL_IDENTIFIER" | "CHARACTER_DATA" => {
                Self::Text
            }
            _ => return None,
        };
        Some(kind)
    }
}

/// Decode column `idx` by its Postgres type name. Unknown types are read as
/// text when the driver allows it.
fn decode_value(row: &PgRow, idx: usize) -> Result<SqlValue, EngineError> {
    // ---
    let column = row.column(idx);
    let type_name = column.type_info().name();
    let Some(kind) = ColumnKind::from_type_name(type_name) else {
        return match row.try_get::<Option<String>, _>(idx) {
            Ok(value) => Ok(value.map_or(SqlValue::Null, SqlValue::Text)),
            Err(e) => Err(EngineError::Decode {
                column: column.name().to_string(),
                reason: format!("unsupported column type {type_name}: {e}"),
            }),
        };
    };

    let value = match kind {
        ColumnKind::Bool => row.try_get::<Option<bool>, _>(idx)?.map(SqlValue::Bool),
        ColumnKind::Int2 => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        ColumnKind::Int4 => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        ColumnKind::Int8 => row.try_get::<Option<i64>, _>(idx)?.map(SqlValue::Int),
        ColumnKind::Float4 => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| SqlValue::Float(v.into())),
        ColumnKind::Float8 => row.try_get::<Option<f64>, _>(idx)?.map(SqlValue::Float),
        ColumnKind::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(SqlValue::Timestamp),
        ColumnKind::TimestampTz => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|v| SqlValue::TimestampTz(v.fixed_offset())),
        ColumnKind::Text => row
            .try_get_unchecked::<Option<String>, _>(idx)?
            .map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
