//! Explicit `!sensor key=value …` command syntax.

use std::sync::LazyLock;

use regex::Regex;

use super::args::{request_from_args, ArgMap, ArgValue};
use crate::error::ParseError;
use crate::models::SensorQueryRequest;

pub const COMMAND_PREFIX: &str = "!sensor";

pub const USAGE: &str = "usage: !sensor sensor_id=... [query_type=reading|description|agg] \
     [limit=...] [since_minutes=...] [start_ts=...] [end_ts=...] [agg=avg|min|max|count]";

/// `key=value`, `key="quoted value"` or `key='quoted value'`.
static PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)=("[^"]*"|'[^']*'|\S+)"#).expect("static regex")
});

/// Whether `input` uses the command syntax at all.
pub fn is_command(input: &str) -> bool {
    // ---
    input
        .trim_start()
        .strip_prefix(COMMAND_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Parse a command line; `None` when the input is not a command.
pub fn parse_command(input: &str) -> Option<Result<SensorQueryRequest, ParseError>> {
    // ---
    if !is_command(input) {
        return None;
    }

    let rest = input.trim()[COMMAND_PREFIX.len()..].trim();
    if rest.is_empty() {
        return Some(Err(ParseError::NoArguments));
    }
    Some(request_from_args(&tokenize(rest)))
}

/// Split an argument line into key/value pairs. Later keys win.
pub fn tokenize(line: &str) -> ArgMap {
    // ---
    PAIR.captures_iter(line)
        .map(|caps| {
            let key = caps[1].to_string();
            let value = unquote(&caps[2]);
            (key, ArgValue::coerce(value))
        })
        .collect()
}

/// Drop surrounding quotes. An unterminated quote loses its stray marks.
fn unquote(raw: &str) -> &str {
    // ---
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw.trim_matches(['"', '\''])
}
