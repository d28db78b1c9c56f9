//! Loose `key=value` arguments and their normalization into a request.
//!
//! Both the `!sensor` command and the model's JSON directive produce an
//! [`ArgMap`]; one function turns it into a [`SensorQueryRequest`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::models::{
    parse_timestamp, AggregateFn, QueryKind, RelativeWindow, SensorQueryRequest, TableOverrides,
    TimeWindow,
};

/// An argument value. Integers keep their source text so opaque identifiers
/// such as `007` survive untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Int { value: i64, raw: String },
    Text(String),
}

impl ArgValue {
    /// Digit-only strings become integers, everything else stays text.
    pub fn coerce(raw: &str) -> Self {
        // ---
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(value) = raw.parse() {
                return Self::Int { value, raw: raw.to_string() };
            }
        }
        Self::Text(raw.to_string())
    }

    pub fn int(value: i64) -> Self {
        Self::Int { value, raw: value.to_string() }
    }

    fn render(&self) -> &str {
        match self {
            Self::Int { raw, .. } => raw,
            Self::Text(s) => s,
        }
    }

    /// Integer reading of the value; digit-only text counts.
    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int { value, .. } => Some(*value),
            Self::Text(s) => match Self::coerce(s.trim()) {
                Self::Int { value, .. } => Some(value),
                Self::Text(_) => None,
            },
        }
    }
}

pub type ArgMap = BTreeMap<String, ArgValue>;

/// Flatten directive `args` into an [`ArgMap`]; nulls are dropped.
pub fn from_json(args: &Map<String, Value>) -> ArgMap {
    // ---
    args.iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::Number(n) => match n.as_i64() {
                    Some(v) => ArgValue::int(v),
                    None => ArgValue::Text(n.to_string()),
                },
                Value::String(s) => ArgValue::Text(s.clone()),
                Value::Bool(b) => ArgValue::Text(b.to_string()),
                other => ArgValue::Text(other.to_string()),
            };
            Some((key.clone(), value))
        })
        .collect()
}

fn text(args: &ArgMap, key: &str) -> Option<String> {
    args.get(key)
        .map(|v| v.render().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn positive(args: &ArgMap, key: &str) -> Result<Option<u32>, ParseError> {
    // ---
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    match value.as_int().map(u32::try_from) {
        Some(Ok(v)) if v > 0 => Ok(Some(v)),
        _ => Err(ParseError::InvalidValue {
            key: key.to_string(),
            value: value.render().to_string(),
            expected: "a positive integer",
        }),
    }
}

/// Apply defaults and validation to loose arguments.
///
/// Recognized keys: `sensor_id` (required), `query_type`, `limit`,
/// `since_minutes`, `window`, `start_ts`, `end_ts`, `agg`, `catalog`,
/// `schema`, `reading_table`, `meta_table`. Unknown keys are ignored.
pub fn request_from_args(args: &ArgMap) -> Result<SensorQueryRequest, ParseError> {
    // ---
    let sensor_id = text(args, "sensor_id").ok_or(ParseError::MissingSensorId)?;
    let mut request = SensorQueryRequest::new(sensor_id);

    if let Some(kind) = text(args, "query_type") {
        request.kind = kind.parse::<QueryKind>()?;
    }
    if let Some(limit) = positive(args, "limit")? {
        request.limit = limit;
    }
    if let Some(agg) = text(args, "agg") {
        request.aggregate = agg.parse::<AggregateFn>()?;
    }

    let relative = match positive(args, "since_minutes")? {
        Some(minutes) => Some(RelativeWindow::minutes(minutes)),
        None => text(args, "window")
            .map(|w| w.parse::<RelativeWindow>())
            .transpose()?,
    };
    let start = text(args, "start_ts").map(|s| parse_timestamp(&s)).transpose()?;
    let end = text(args, "end_ts").map(|s| parse_timestamp(&s)).transpose()?;
    request.window = TimeWindow::resolve(relative, start, end);

    request.tables = TableOverrides {
        catalog: text(args, "catalog"),
        schema: text(args, "schema"),
        metrics_table: text(args, "reading_table"),
        metadata_table: text(args, "meta_table"),
    };

    Ok(request)
}
