//! Trino backend over the HTTP client protocol.
//!
//! A statement is POSTed to `/v1/statement` and the coordinator's `nextUri`
//! chain is followed until the result set is drained. Parameterized statements
//! travel as a prepared statement header plus `EXECUTE … USING`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};
use url::{form_urlencoded, Url};

use super::{Dialect, QueryEngine, Row, SqlParam, SqlValue, Statement};
use crate::config::{TableConfig, TrinoConfig};
use crate::error::EngineError;

const PREPARED_NAME: &str = "live_data_query";
const SOURCE: &str = "live-data-agent";

// ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResults {
    id: String,
    next_uri: Option<String>,
    columns: Option<Vec<ColumnInfo>>,
    data: Option<Vec<Vec<Value>>>,
    error: Option<QueryErrorInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryErrorInfo {
    message: String,
    error_name: Option<String>,
}

pub struct TrinoEngine {
    http: reqwest::Client,
    base_url: Url,
    user: String,
    password: Option<String>,
    catalog: String,
    schema: String,
}

impl TrinoEngine {
    // ---
    pub fn new(cfg: &TrinoConfig, tables: &TableConfig) -> Result<Self, EngineError> {
        // ---
        let base_url = coordinator_url(&cfg.host, cfg.port)?;

        // Basic auth is only sent over https.
        let password = cfg
            .password
            .clone()
            .filter(|_| base_url.scheme() == "https");
        if cfg.password.is_some() && password.is_none() {
            warn!("TRINO_PASSWORD is set but {} is not https; connecting without auth", base_url);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url,
            user: cfg.user.clone(),
            password,
            catalog: tables.catalog.clone(),
            schema: tables.schema.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn with_session(&self, request: RequestBuilder) -> RequestBuilder {
        // ---
        let request = request
            .header("X-Trino-User", &self.user)
            .header("X-Trino-Source", SOURCE)
            .header("X-Trino-Catalog", &self.catalog)
            .header("X-Trino-Schema", &self.schema);
        match &self.password {
            Some(password) => request.basic_auth(&self.user, Some(password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<QueryResults, EngineError> {
        // ---
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(300).collect();
            return Err(EngineError::Protocol(format!("HTTP {status}: {truncated}")));
        }
        Ok(response.json::<QueryResults>().await?)
    }
}

#[async_trait]
impl QueryEngine for TrinoEngine {
    // ---
    fn dialect(&self) -> Dialect {
        Dialect::Trino
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, EngineError> {
        // ---
        let endpoint = self
            .base_url
            .join("v1/statement")
            .map_err(|e| EngineError::Protocol(e.to_string()))?;

        let mut request = self.with_session(self.http.post(endpoint));
        let body = if statement.params.is_empty() {
            statement.sql.clone()
        } else {
            request = request.header("X-Trino-Prepared-Statement", prepared_header(&statement.sql));
            execute_sql(&statement.params)
        };

        let mut page = self.send(request.body(body)).await?;
        let mut columns: Vec<ColumnInfo> = Vec::new();
        let mut rows = Vec::new();

        loop {
            trace!(query_id = %page.id, "trino page");
            if let Some(error) = page.error.take() {
                return Err(EngineError::Query {
                    name: error.error_name.unwrap_or_else(|| "QUERY_FAILED".into()),
                    message: error.message,
                });
            }
            if columns.is_empty() {
                columns = page.columns.take().unwrap_or_default();
            }
            for raw in page.data.take().unwrap_or_default() {
                rows.push(decode_row(&columns, &raw)?);
            }
            match page.next_uri.take() {
                Some(next) => page = self.send(self.with_session(self.http.get(next))).await?,
                None => break,
            }
        }

        Ok(rows)
    }
}

/// Coordinator base URL from a host that may or may not carry a scheme.
fn coordinator_url(host: &str, port: u16) -> Result<Url, EngineError> {
    // ---
    let host = host.trim();
    let raw = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };

    let mut url = Url::parse(&raw)
        .map_err(|e| EngineError::Protocol(format!("invalid TRINO_HOST '{host}': {e}")))?;
    if url.port().is_none() {
        url.set_port(Some(port))
            .map_err(|_| EngineError::Protocol(format!("invalid TRINO_HOST '{host}'")))?;
    }
    Ok(url)
}

fn prepared_header(sql: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(sql.as_bytes()).collect();
    format!("{PREPARED_NAME}={encoded}")
}

fn execute_sql(params: &[SqlParam]) -> String {
    // ---
    let values: Vec<String> = params.iter().map(literal).collect();
    format!("EXECUTE {PREPARED_NAME} USING {}", values.join(", "))
}

/// Typed literal for `EXECUTE … USING`.
fn literal(param: &SqlParam) -> String {
    match param {
        SqlParam::Text(s) => format!("'{}'", s.replace('\'', "''")),
        SqlParam::Int(v) => v.to_string(),
        SqlParam::Timestamp(ts) => format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.3f")),
    }
}

fn decode_row(columns: &[ColumnInfo], raw: &[Value]) -> Result<Row, EngineError> {
    // ---
    if columns.len() < raw.len() {
        return Err(EngineError::Protocol(format!(
            "row has {} values but {} columns were announced",
            raw.len(),
            columns.len()
        )));
    }
    columns
        .iter()
        .zip(raw)
        .map(|(column, value)| decode_value(value, &column.type_name, &column.name))
        .collect()
}

/// Decode one JSON cell according to its Trino type signature.
fn decode_value(value: &Value, type_name: &str, column: &str) -> Result<SqlValue, EngineError> {
    // ---
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let base = type_name
        .split('(')
        .next()
        .unwrap_or(type_name)
        .trim()
        .to_ascii_lowercase();

    let decoded = match base.as_str() {
        "boolean" => value.as_bool().map(SqlValue::Bool),
        "tinyint" | "smallint" | "integer" | "bigint" => value.as_i64().map(SqlValue::Int),
        "real" | "double" => match value {
            Value::Number(n) => n.as_f64().map(SqlValue::Float),
            // NaN and infinities arrive as strings
            Value::String(s) => s.parse().ok().map(SqlValue::Float),
            _ => None,
        },
        "decimal" => match value {
            Value::String(s) => Some(SqlValue::Decimal(s.clone())),
            other => other.as_f64().map(SqlValue::Float),
        },
        "timestamp" => value.as_str().and_then(|s| {
            if type_name.contains("with time zone") {
                parse_timestamp_tz(s)
            } else {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(SqlValue::Timestamp)
            }
        }),
        _ => Some(match value {
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }),
    };

    decoded.ok_or_else(|| EngineError::Decode {
        column: column.to_string(),
        reason: format!("unexpected {type_name} value {value}"),
    })
}

/// `2024-05-01 12:00:00.000 UTC` or `… +02:00`; named zones keep wall time.
fn parse_timestamp_tz(s: &str) -> Option<SqlValue> {
    // ---
    let (local, zone) = s.rsplit_once(' ')?;
    let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f").ok()?;

    let offset = match zone {
        "UTC" | "Z" | "GMT" => FixedOffset::east_opt(0),
        z if z.starts_with('+') || z.starts_with('-') => {
            DateTime::parse_from_str(&format!("2000-01-01 00:00:00 {z}"), "%Y-%m-%d %H:%M:%S %:z")
                .ok()
                .map(|dt| *dt.offset())
        }
        _ => None,
    };

    match offset {
        Some(offset) => naive
            .and_local_timezone(offset)
            .single()
            .map(SqlValue::TimestampTz),
        None => Some(SqlValue::Timestamp(naive)),
    }
}
