//! Sensor queries against the configured backend.
//!
//! Builds statements with [`sql::SensorSql`], runs them on a [`QueryEngine`]
//! and shapes the returned rows into the JSON contract in `models.rs`.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::TableConfig;
use crate::engine::{cell, Dialect, QueryEngine, Row, SqlValue, Statement};
use crate::error::ToolError;
use crate::models::{
    AggregateFn, QueryKind, SensorAggregate, SensorDescriptor, SensorPoint, SensorQueryRequest,
    SensorQueryResult, SensorSummary, TableOverrides, ToolOutput, ToolRequest, MAX_SENSORS,
};

pub mod sql;

use sql::SensorSql;

// ---

/// Catalogs, schemas and tables visible to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    pub catalog: String,
    pub schema: String,
    pub metadata_table: String,
    pub metrics_table: String,
    pub catalogs: Vec<String>,
    pub schemas: Vec<String>,
    pub tables: Vec<String>,
}

/// Query builder bound to a backend and the canonical tables.
pub struct SensorQueries {
    engine: Arc<dyn QueryEngine>,
    tables: TableConfig,
}

impl SensorQueries {
    // ---
    pub fn new(engine: Arc<dyn QueryEngine>, tables: TableConfig) -> Self {
        Self { engine, tables }
    }

    fn dialect(&self) -> Dialect {
        self.engine.dialect()
    }

    fn statements(&self, overrides: &TableOverrides) -> Result<SensorSql, ToolError> {
        Ok(SensorSql::new(self.dialect(), &self.tables, overrides)?)
    }

    /// Execute a routed tool request.
    pub async fn run(&self, request: &ToolRequest) -> Result<ToolOutput, ToolError> {
        // ---
        match request {
            ToolRequest::ListSensors => Ok(ToolOutput::Sensors(self.list_sensors().await?)),
            ToolRequest::QuerySensor(req) => match req.kind {
                QueryKind::Reading => Ok(ToolOutput::Query(self.query_sensor(req).await?)),
                QueryKind::Description => {
                    Ok(ToolOutput::Description(self.describe_sensor(req).await?))
                }
                QueryKind::Aggregate => {
                    Ok(ToolOutput::Aggregate(self.aggregate_sensor(req).await?))
                }
            },
        }
    }

    /// Every sensor of the metadata table, ascending by id, at most 200.
    pub async fn list_sensors(&self) -> Result<Vec<SensorDescriptor>, ToolError> {
        // ---
        let statement = self
            .statements(&TableOverrides::default())?
            .list_sensors();
        debug!(sql = %statement.sql, "list_sensors");

        let rows = self.engine.fetch_all(&statement).await?;
        let mut sensors: Vec<SensorDescriptor> = rows.iter().filter_map(descriptor_from_row).collect();
        sensors.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        sensors.truncate(MAX_SENSORS as usize);
        Ok(sensors)
    }

    /// Window summary plus the most recent points.
    pub async fn query_sensor(
        &self,
        req: &SensorQueryRequest,
    ) -> Result<SensorQueryResult, ToolError> {
        // ---
        let sql = self.statements(&req.tables)?;
        let summary_stmt = sql.summary(req);
        let points_stmt = sql.recent_points(req);
        debug!(sql = %summary_stmt.sql, params = ?summary_stmt.params, "query_sensor summary");

        let summary_rows = self.engine.fetch_all(&summary_stmt).await?;
        let point_rows = self.engine.fetch_all(&points_stmt).await?;

        let mut last_points: Vec<SensorPoint> = point_rows.iter().filter_map(point_from_row).collect();
        last_points.truncate(req.point_limit() as usize);

        Ok(SensorQueryResult {
            sensor_id: req.sensor_id.clone(),
            summary: summary_from_row(summary_rows.first()),
            last_points,
        })
    }

    /// Metadata row of one sensor.
    pub async fn describe_sensor(
        &self,
        req: &SensorQueryRequest,
    ) -> Result<SensorDescriptor, ToolError> {
        // ---
        let statement = self.statements(&req.tables)?.describe(&req.sensor_id);
        let rows = self.engine.fetch_all(&statement).await?;
        rows.iter()
            .find_map(descriptor_from_row)
            .ok_or_else(|| ToolError::NotFound(req.sensor_id.clone()))
    }

    /// One aggregate function over the window.
    pub async fn aggregate_sensor(
        &self,
        req: &SensorQueryRequest,
    ) -> Result<SensorAggregate, ToolError> {
        // ---
        let statement = self.statements(&req.tables)?.aggregate(req);
        debug!(sql = %statement.sql, params = ?statement.params, "aggregate_sensor");

        let rows = self.engine.fetch_all(&statement).await?;
        let (value, count) = match rows.first() {
            Some(row) => (cell(row, 0).as_f64(), cell(row, 1).as_count()),
            None => (None, 0),
        };

        Ok(SensorAggregate {
            sensor_id: req.sensor_id.clone(),
            agg: req.aggregate,
            value: aggregate_value(req.aggregate, value, count),
            count,
        })
    }

    /// Inspect what the backend exposes around the configured tables.
    pub async fn topology(&self) -> Result<Topology, ToolError> {
        // ---
        let dialect = self.dialect();
        let resolved = self.statements(&TableOverrides::default())?;
        let (catalog, schema) = (&self.tables.catalog, &self.tables.schema);

        let catalogs = self.first_column(&sql::show_catalogs(dialect)).await?;

        let mut schemas = Vec::new();
        let mut tables = Vec::new();
        if dialect == Dialect::Postgres || catalogs.contains(catalog) {
            schemas = self.first_column(&sql::show_schemas(dialect, catalog)?).await?;
            if schemas.contains(schema) {
                tables = self
                    .first_column(&sql::show_tables(dialect, catalog, schema)?)
                    .await?;
            }
        }

        Ok(Topology {
            catalog: catalog.clone(),
            schema: schema.clone(),
            metadata_table: resolved.metadata_table().to_string(),
            metrics_table: resolved.metrics_table().to_string(),
            catalogs,
            schemas,
            tables,
        })
    }

    async fn first_column(
        &self,
        statement: &Statement,
    ) -> Result<Vec<String>, ToolError> {
        let rows = self.engine.fetch_all(statement).await?;
        Ok(rows.iter().filter_map(|row| cell(row, 0).as_text()).collect())
    }
}

// --- Row shaping

fn descriptor_from_row(row: &Row) -> Option<SensorDescriptor> {
    // ---
    let sensor_id = cell(row, 0).as_text()?;
    let display_name = cell(row, 1).as_text().unwrap_or_else(|| sensor_id.clone());
    Some(SensorDescriptor {
        sensor_id,
        display_name,
    })
}

/// Shape `first_ts, last_ts, row_count, avg, min, max`; no row means no data.
fn summary_from_row(row: Option<&Row>) -> SensorSummary {
    // ---
    let Some(row) = row else {
        return SensorSummary::empty();
    };

    let count = cell(row, 2).as_count();
    if count == 0 {
        return SensorSummary::empty();
    }

    SensorSummary {
        first_ts: cell(row, 0).to_iso8601(),
        last_ts: cell(row, 1).to_iso8601(),
        count,
        avg: cell(row, 3).as_f64(),
        min: cell(row, 4).as_f64(),
        max: cell(row, 5).as_f64(),
    }
}

fn point_from_row(row: &Row) -> Option<SensorPoint> {
    // ---
    let ts = cell(row, 0).to_iso8601()?;
    let value = match cell(row, 1) {
        SqlValue::Null => None,
        other => other.as_f64(),
    };
    Some(SensorPoint { ts, value })
}

/// A count over no rows is a real zero; the other statistics are missing.
fn aggregate_value(agg: AggregateFn, value: Option<f64>, count: u64) -> Option<f64> {
    match (agg, count) {
        (AggregateFn::Count, _) => Some(value.unwrap_or(count as f64)),
        (_, 0) => None,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::NaiveDate;

    fn ts(minute: u32) -> SqlValue {
        SqlValue::Timestamp(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(12, minute, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_empty_window_aggregates() {
        // ---
        assert_eq!(aggregate_value(AggregateFn::Count, None, 0), Some(0.0));
        assert_eq!(aggregate_value(AggregateFn::Count, Some(0.0), 0), Some(0.0));
        assert_eq!(aggregate_value(AggregateFn::Count, Some(12.0), 12), Some(12.0));
        assert_eq!(aggregate_value(AggregateFn::Avg, Some(0.0), 0), None);
        assert_eq!(aggregate_value(AggregateFn::Max, Some(23.5), 4), Some(23.5));
    }

    #[test]
    fn test_zero_rows_summary_has_null_statistics() {
        // ---
        let row = vec![
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Int(0),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
        ];
        assert_eq!(summary_from_row(Some(&row)), SensorSummary::empty());
        assert_eq!(summary_from_row(None), SensorSummary::empty());
    }

    #[test]
    fn test_summary_keeps_real_zero_values() {
        // ---
        let row = vec![
            ts(0),
            ts(9),
            SqlValue::Int(10),
            SqlValue::Float(0.0),
            SqlValue::Decimal("-1.5".into()),
            SqlValue::Float(1.5),
        ];
        let summary = summary_from_row(Some(&row));
        assert_eq!(summary.count, 10);
        assert_eq!(summary.avg, Some(0.0));
        assert_eq!(summary.min, Some(-1.5));
        assert_eq!(summary.first_ts.as_deref(), Some("2024-05-01T12:00:00"));
        assert_eq!(summary.last_ts.as_deref(), Some("2024-05-01T12:09:00"));
    }

    #[test]
    fn test_points_need_a_timestamp() {
        // ---
        assert_eq!(
            point_from_row(&vec![ts(1), SqlValue::Float(21.5)]),
            Some(SensorPoint {
                ts: "2024-05-01T12:01:00".into(),
                value: Some(21.5)
            })
        );
        assert_eq!(
            point_from_row(&vec![ts(1), SqlValue::Null]).unwrap().value,
            None
        );
        assert_eq!(point_from_row(&vec![SqlValue::Null, SqlValue::Int(1)]), None);
    }

    #[test]
    fn test_descriptor_falls_back_to_id() {
        // ---
        let row = vec![SqlValue::Int(42), SqlValue::Null];
        assert_eq!(
            descriptor_from_row(&row),
            Some(SensorDescriptor {
                sensor_id: "42".into(),
                display_name: "42".into()
            })
        );
        assert_eq!(descriptor_from_row(&vec![SqlValue::Null]), None);
    }
}
