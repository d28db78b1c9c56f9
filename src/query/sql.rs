//! SQL text for the metadata and metrics tables.
//!
//! Values (sensor ids, window magnitudes, timestamps) are always bound as
//! parameters. Identifiers cannot be bound, so every table name part is checked
//! against a plain identifier grammar before it is spliced into the text.

use std::fmt;

use crate::config::TableConfig;
use crate::engine::{Dialect, SqlParam, Statement};
use crate::error::ParseError;
use crate::models::{SensorQueryRequest, TableOverrides, TimeUnit, TimeWindow, MAX_SENSORS};

// ---

/// A fully-qualified `catalog.schema.table` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    /// Expand a possibly partial dotted name against default catalog/schema.
    ///
    /// `table` → `catalog.schema.table`, `schema.table` → `catalog.schema.table`,
    /// a three part name is kept as is.
    pub fn qualify(name: &str, catalog: &str, schema: &str) -> Result<Self, ParseError> {
        // ---
        let parts: Vec<&str> = name.trim().split('.').collect();
        let (catalog, schema, table) = match parts.as_slice() {
            [table] => (catalog, schema, *table),
            [schema, table] => (catalog, *schema, *table),
            [catalog, schema, table] => (*catalog, *schema, *table),
            _ => return Err(ParseError::InvalidIdentifier(name.to_string())),
        };

        for part in [catalog, schema, table] {
            if !is_identifier(part) {
                return Err(ParseError::InvalidIdentifier(part.to_string()));
            }
        }

        Ok(Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Name as written in SQL for `dialect`.
    ///
    /// A Postgres connection is bound to one database, so the catalog is dropped.
    pub fn render(&self, dialect: Dialect) -> String {
        match dialect {
            Dialect::Trino => self.to_string(),
            Dialect::Postgres => format!("{}.{}", self.schema, self.table),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Collects parameters and hands out placeholders in the dialect's syntax.
struct Binder {
    dialect: Dialect,
    params: Vec<SqlParam>,
}

impl Binder {
    // ---
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        match self.dialect {
            Dialect::Trino => "?".to_string(),
            Dialect::Postgres => format!("${}", self.params.len()),
        }
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

fn double_type(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Trino => "DOUBLE",
        Dialect::Postgres => "DOUBLE PRECISION",
    }
}

/// `now - <placeholder> unit` in the dialect's interval arithmetic.
fn since_expr(dialect: Dialect, placeholder: &str, unit: TimeUnit) -> String {
    // ---
    match dialect {
        Dialect::Trino => format!(
            "current_timestamp - ({placeholder} * INTERVAL '1' {})",
            unit.as_str().to_ascii_uppercase()
        ),
        Dialect::Postgres => format!(
            "now() - (CAST({placeholder} AS DOUBLE PRECISION) * INTERVAL '1 {}')",
            unit.as_str()
        ),
    }
}

// ---

/// Statement factory for one request's resolved tables.
#[derive(Debug, Clone)]
pub struct SensorSql {
    dialect: Dialect,
    metadata: TableRef,
    metrics: TableRef,
}

impl SensorSql {
    /// Resolve the metadata and metrics tables, applying caller overrides.
    pub fn new(
        dialect: Dialect,
        tables: &TableConfig,
        overrides: &TableOverrides,
    ) -> Result<Self, ParseError> {
        // ---
        let catalog = overrides.catalog.as_deref().unwrap_or(&tables.catalog);
        let schema = overrides.schema.as_deref().unwrap_or(&tables.schema);
        let metadata = overrides
            .metadata_table
            .as_deref()
            .unwrap_or(&tables.metadata_table);
        let metrics = overrides
            .metrics_table
            .as_deref()
            .unwrap_or(&tables.metrics_table);

        Ok(Self {
            dialect,
            metadata: TableRef::qualify(metadata, catalog, schema)?,
            metrics: TableRef::qualify(metrics, catalog, schema)?,
        })
    }

    pub fn metadata_table(&self) -> &TableRef {
        &self.metadata
    }

    pub fn metrics_table(&self) -> &TableRef {
        &self.metrics
    }

    /// `(sensor_id, name)` for every sensor, ascending, capped.
    pub fn list_sensors(&self) -> Statement {
        // ---
        Statement::new(format!(
            "SELECT CAST(sensor_id AS VARCHAR) AS sensor_id, \
             COALESCE(sensor_name, CAST(sensor_id AS VARCHAR)) AS name \
             FROM {} ORDER BY sensor_id LIMIT {MAX_SENSORS}",
            self.metadata.render(self.dialect)
        ))
    }

    /// Metadata row of a single sensor.
    pub fn describe(&self, sensor_id: &str) -> Statement {
        // ---
        let mut binder = Binder::new(self.dialect);
        let id = binder.bind(SqlParam::Text(sensor_id.to_string()));
        binder.finish(format!(
            "SELECT CAST(sensor_id AS VARCHAR) AS sensor_id, \
             COALESCE(sensor_name, CAST(sensor_id AS VARCHAR)) AS name \
             FROM {} WHERE sensor_id = {id} LIMIT 1",
            self.metadata.render(self.dialect)
        ))
    }

    /// Single-row window summary:
    /// `first_ts, last_ts, row_count, avg_value, min_value, max_value`.
    pub fn summary(&self, req: &SensorQueryRequest) -> Statement {
        // ---
        let mut binder = Binder::new(self.dialect);
        let predicate = self.predicate(req, &mut binder);
        let double = double_type(self.dialect);
        binder.finish(format!(
            "SELECT MIN(\"timestamp\") AS first_ts, MAX(\"timestamp\") AS last_ts, \
             COUNT(*) AS row_count, \
             CAST(AVG(value) AS {double}) AS avg_value, \
             CAST(MIN(value) AS {double}) AS min_value, \
             CAST(MAX(value) AS {double}) AS max_value \
             FROM {} WHERE {predicate}",
            self.metrics.render(self.dialect)
        ))
    }

    /// Most recent points of the window: `timestamp, value`.
    pub fn recent_points(&self, req: &SensorQueryRequest) -> Statement {
        // ---
        let mut binder = Binder::new(self.dialect);
        let predicate = self.predicate(req, &mut binder);
        binder.finish(format!(
            "SELECT \"timestamp\", CAST(value AS {}) AS value \
             FROM {} WHERE {predicate} \
             ORDER BY \"timestamp\" DESC LIMIT {}",
            double_type(self.dialect),
            self.metrics.render(self.dialect),
            req.point_limit()
        ))
    }

    /// One aggregate over the window: `agg_value, row_count`.
    pub fn aggregate(&self, req: &SensorQueryRequest) -> Statement {
        // ---
        let mut binder = Binder::new(self.dialect);
        let predicate = self.predicate(req, &mut binder);
        binder.finish(format!(
            "SELECT CAST({}(value) AS {}) AS agg_value, COUNT(*) AS row_count \
             FROM {} WHERE {predicate}",
            req.aggregate.sql_name(),
            double_type(self.dialect),
            self.metrics.render(self.dialect)
        ))
    }

    /// `sensor_id = ?` plus at most one of the window forms.
    fn predicate(&self, req: &SensorQueryRequest, binder: &mut Binder) -> String {
        // ---
        let mut clauses = vec![format!(
            "sensor_id = {}",
            binder.bind(SqlParam::Text(req.sensor_id.clone()))
        )];

        match &req.window {
            TimeWindow::All => {}
            TimeWindow::Relative(window) => {
                let magnitude = binder.bind(SqlParam::Int(i64::from(window.magnitude)));
                clauses.push(format!(
                    "\"timestamp\" >= {}",
                    since_expr(self.dialect, &magnitude, window.unit)
                ));
            }
            TimeWindow::Bounds { start, end } => {
                if let Some(start) = start {
                    let p = binder.bind(SqlParam::Timestamp(*start));
                    clauses.push(format!("\"timestamp\" >= {p}"));
                }
                if let Some(end) = end {
                    let p = binder.bind(SqlParam::Timestamp(*end));
                    clauses.push(format!("\"timestamp\" <= {p}"));
                }
            }
        }

        clauses.join(" AND ")
    }
}

// --- Topology

pub fn show_catalogs(dialect: Dialect) -> Statement {
    match dialect {
        Dialect::Trino => Statement::new("SHOW CATALOGS"),
        Dialect::Postgres => Statement::new("SELECT current_database()"),
    }
}

pub fn show_schemas(dialect: Dialect, catalog: &str) -> Result<Statement, ParseError> {
    // ---
    match dialect {
        Dialect::Trino => {
            if !is_identifier(catalog) {
                return Err(ParseError::InvalidIdentifier(catalog.to_string()));
            }
            Ok(Statement::new(format!("SHOW SCHEMAS FROM {catalog}")))
        }
        Dialect::Postgres => Ok(Statement::new(
            "SELECT schema_name::text FROM information_schema.schemata ORDER BY 1",
        )),
    }
}

pub fn show_tables(dialect: Dialect, catalog: &str, schema: &str) -> Result<Statement, ParseError> {
    // ---
    match dialect {
        Dialect::Trino => {
            for part in [catalog, schema] {
                if !is_identifier(part) {
                    return Err(ParseError::InvalidIdentifier(part.to_string()));
                }
            }
            Ok(Statement::new(format!("SHOW TABLES FROM {catalog}.{schema}")))
        }
        Dialect::Postgres => {
            let mut binder = Binder::new(dialect);
            let p = binder.bind(SqlParam::Text(schema.to_string()));
            Ok(binder.finish(format!(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = {p} ORDER BY 1"
            )))
        }
    }
}
