//! Data models for sensor requests and results.
//!
//! Requests are normalized here regardless of which input syntax produced them;
//! results carry the JSON contract shared by the terminal and the HTTP API.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::ParseError;

/// Default row cap for point queries when none is given.
pub const DEFAULT_LIMIT: u32 = 100;

/// Maximum number of recent points returned with a summary.
pub const MAX_POINTS: u32 = 10;

/// Maximum number of sensors returned by a listing.
pub const MAX_SENSORS: u32 = 200;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    // ---
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "s" => Some(Self::Second),
            "m" => Some(Self::Minute),
            "h" => Some(Self::Hour),
            "d" => Some(Self::Day),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    fn suffix(self) -> char {
        match self {
            Self::Second => 's',
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
        }
    }
}

/// A look-back duration such as `15m` or `24h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeWindow {
    pub magnitude: u32,
    pub unit: TimeUnit,
}

impl RelativeWindow {
    // ---
    pub fn minutes(magnitude: u32) -> Self {
        Self {
            magnitude,
            unit: TimeUnit::Minute,
        }
    }
}

impl FromStr for RelativeWindow {
    type Err = ParseError;

    /// Parse `<digits><unit>` where unit is one of `s`, `m`, `h`, `d`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        let window = s.trim();
        let split = window
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ParseError::InvalidWindow(window.to_string()))?;
        let (digits, suffix) = window.split_at(split);

        let magnitude = digits
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ParseError::InvalidWindow(window.to_string()))?;

        let unit = TimeUnit::from_suffix(suffix).ok_or_else(|| ParseError::UnknownWindowUnit {
            window: window.to_string(),
            unit: suffix.to_string(),
        })?;

        Ok(Self { magnitude, unit })
    }
}

impl fmt::Display for RelativeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}

/// Time constraint of a sensor query. Exactly one form is ever active.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimeWindow {
    /// Unconstrained; bounded only by the row limit.
    #[default]
    All,
    Relative(RelativeWindow),
    Bounds {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
}

impl TimeWindow {
    /// Combine the optional window parts; a relative window wins over bounds.
    pub fn resolve(
        relative: Option<RelativeWindow>,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Self {
        // ---
        match (relative, start, end) {
            (Some(window), _, _) => Self::Relative(window),
            (None, None, None) => Self::All,
            (None, start, end) => Self::Bounds { start, end },
        }
    }
}

/// Parse a user supplied timestamp into UTC wall-clock time.
///
/// Accepts RFC 3339 (offsets are converted to UTC), naive ISO-8601 with a `T`
/// or a space separator, and bare dates (midnight).
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, ParseError> {
    // ---
    let raw = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ParseError::InvalidTimestamp(raw.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryKind {
    #[default]
    Reading,
    Description,
    Aggregate,
}

impl FromStr for QueryKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reading" | "readings" => Ok(Self::Reading),
            "description" | "describe" => Ok(Self::Description),
            "agg" | "aggregate" => Ok(Self::Aggregate),
            _ => Err(ParseError::InvalidValue {
                key: "query_type".into(),
                value: s.to_string(),
                expected: "reading, description or agg",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    #[default]
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFn {
    // ---
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Count => "COUNT",
        }
    }
}

impl FromStr for AggregateFn {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" | "mean" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "count" => Ok(Self::Count),
            _ => Err(ParseError::InvalidValue {
                key: "agg".into(),
                value: s.to_string(),
                expected: "avg, min, max or count",
            }),
        }
    }
}

/// Caller supplied redirections of the federated tables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableOverrides {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub metrics_table: Option<String>,
    pub metadata_table: Option<String>,
}

/// Normalized intent extracted from any input channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorQueryRequest {
    pub sensor_id: String,
    pub kind: QueryKind,
    pub window: TimeWindow,
    pub limit: u32,
    pub aggregate: AggregateFn,
    pub tables: TableOverrides,
}

impl SensorQueryRequest {
    // ---
    pub fn new(sensor_id: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            kind: QueryKind::default(),
            window: TimeWindow::default(),
            limit: DEFAULT_LIMIT,
            aggregate: AggregateFn::default(),
            tables: TableOverrides::default(),
        }
    }

    /// Number of recent points to fetch alongside the summary.
    pub fn point_limit(&self) -> u32 {
        self.limit.min(MAX_POINTS)
    }
}

/// What the router asks the query layer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    ListSensors,
    QuerySensor(SensorQueryRequest),
}

impl ToolRequest {
    /// Label used when annotating tool failures, e.g. `query_sensor(TEMP_01)`.
    pub fn label(&self) -> String {
        // ---
        match self {
            Self::ListSensors => "list_sensors".to_string(),
            Self::QuerySensor(req) => {
                let tool = match req.kind {
                    QueryKind::Reading => "query_sensor",
                    QueryKind::Description => "describe_sensor",
                    QueryKind::Aggregate => "aggregate_sensor",
                };
                format!("{tool}({})", req.sensor_id)
            }
        }
    }
}

// --- Results

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSummary {
    pub first_ts: Option<String>,
    pub last_ts: Option<String>,
    pub count: u64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SensorSummary {
    /// Summary of a window with no matching rows.
    pub fn empty() -> Self {
        Self {
            first_ts: None,
            last_ts: None,
            count: 0,
            avg: None,
            min: None,
            max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorPoint {
    pub ts: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorQueryResult {
    pub sensor_id: String,
    pub summary: SensorSummary,
    /// Most recent first.
    pub last_points: Vec<SensorPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorDescriptor {
    pub sensor_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAggregate {
    pub sensor_id: String,
    pub agg: AggregateFn,
    pub value: Option<f64>,
    pub count: u64,
}

/// Successful output of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Sensors(Vec<SensorDescriptor>),
    Query(SensorQueryResult),
    Description(SensorDescriptor),
    Aggregate(SensorAggregate),
}

/// The `{error: <message>}` payload returned in place of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
