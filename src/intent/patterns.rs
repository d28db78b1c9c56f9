//! Fixed natural-language grammar.
//!
//! Matches are anchored at both ends and case-insensitive; anything that does
//! not fully match falls through to chat instead of being partially parsed.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;
use crate::models::{parse_timestamp, RelativeWindow, SensorQueryRequest, TimeWindow};

static LIST_SENSORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:list|show)\s+)?sensors\s*$").expect("static regex")
});

static QUERY_SENSOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^\s*
          (?:query|show|get)\s+sensor\s+
          (?P<id>[A-Za-z0-9_\-:.]+)
          (?:\s+window\s*=\s*(?P<window>\S+))?
          (?:\s+start\s*=\s*(?P<start>\S+))?
          (?:\s+end\s*=\s*(?P<end>\S+))?
          \s*$",
    )
    .expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternMatch {
    ListSensors,
    QuerySensor(Result<SensorQueryRequest, ParseError>),
}

pub fn match_pattern(input: &str) -> Option<PatternMatch> {
    // ---
    if LIST_SENSORS.is_match(input) {
        return Some(PatternMatch::ListSensors);
    }

    let caps = QUERY_SENSOR.captures(input)?;
    let build = || -> Result<SensorQueryRequest, ParseError> {
        let mut request = SensorQueryRequest::new(&caps["id"]);
        let relative = caps
            .name("window")
            .map(|m| m.as_str().parse::<RelativeWindow>())
            .transpose()?;
        let start = caps
            .name("start")
            .map(|m| parse_timestamp(m.as_str()))
            .transpose()?;
        let end = caps
            .name("end")
            .map(|m| parse_timestamp(m.as_str()))
            .transpose()?;
        request.window = TimeWindow::resolve(relative, start, end);
        Ok(request)
    };
    Some(PatternMatch::QuerySensor(build()))
}
