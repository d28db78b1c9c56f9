//! JSON tool directives embedded in a model reply.
//!
//! The model is asked to answer with
//! `{"action": "call_query_sensor", "args": {...}}` when it needs data.
//! Replies without a recognizable directive are plain chat.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::args::{from_json, request_from_args};
use crate::error::ParseError;
use crate::models::ToolRequest;

pub const DIRECTIVE_ACTION: &str = "call_query_sensor";

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// No directive; the reply is a final answer.
    None,
    Call(ToolRequest),
    /// A directive was present but its arguments were unusable.
    Invalid(ParseError),
}

/// Find the first JSON object in free text, preferring a fenced block.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    // ---
    if let Some(caps) = FENCED_JSON.captures(text) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(map);
        }
    }

    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}

pub fn parse_directive(reply: &str) -> Directive {
    // ---
    let Some(object) = extract_json_object(reply) else {
        return Directive::None;
    };
    if object.get("action").and_then(Value::as_str) != Some(DIRECTIVE_ACTION) {
        return Directive::None;
    }

    let args = match object.get("args") {
        Some(Value::Object(args)) => from_json(args),
        Some(_) | None => return Directive::Invalid(ParseError::MissingSensorId),
    };
    match request_from_args(&args) {
        Ok(request) => Directive::Call(ToolRequest::QuerySensor(request)),
        Err(e) => Directive::Invalid(e),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{QueryKind, RelativeWindow, TimeWindow};

    #[test]
    fn test_bare_directive() {
        // ---
        let reply = r#"{"action":"call_query_sensor","args":{"sensor_id":"TEMP_01","since_minutes":60}}"#;
        let Directive::Call(ToolRequest::QuerySensor(req)) = parse_directive(reply) else {
            panic!("expected a call");
        };
        assert_eq!(req.sensor_id, "TEMP_01");
        assert_eq!(req.kind, QueryKind::Reading);
        assert_eq!(req.window, TimeWindow::Relative(RelativeWindow::minutes(60)));
    }

    #[test]
    fn test_string_sensor_id_is_kept_verbatim() {
        // ---
        let reply = r#"{"action":"call_query_sensor","args":{"sensor_id":"0042","limit":"5"}}"#;
        let Directive::Call(ToolRequest::QuerySensor(req)) = parse_directive(reply) else {
            panic!("expected a call");
        };
        assert_eq!(req.sensor_id, "0042");
        assert_eq!(req.limit, 5);
    }

    #[test]
    fn test_fenced_directive_with_prose() {
        // ---
        let reply = "Let me check that.\n```json\n{\"action\": \"call_query_sensor\", \
                     \"args\": {\"sensor_id\": \"P7\", \"query_type\": \"description\"}}\n```\nOne moment.";
        let Directive::Call(ToolRequest::QuerySensor(req)) = parse_directive(reply) else {
            panic!("expected a call");
        };
        assert_eq!(req.kind, QueryKind::Description);
    }

    #[test]
    fn test_embedded_object_after_braces_in_prose() {
        // ---
        let reply = r#"Sets look like {a, b}. {"action":"call_query_sensor","args":{"sensor_id":"X"}} ok"#;
        assert!(matches!(parse_directive(reply), Directive::Call(_)));
    }

    #[test]
    fn test_plain_chat_and_other_json() {
        // ---
        assert_eq!(parse_directive("The sensor looks healthy."), Directive::None);
        assert_eq!(parse_directive(r#"{"answer": 42}"#), Directive::None);
        assert_eq!(parse_directive("{not json"), Directive::None);
    }

    #[test]
    fn test_bad_arguments_are_reported() {
        // ---
        let reply = r#"{"action":"call_query_sensor","args":{"limit":5}}"#;
        assert_eq!(
            parse_directive(reply),
            Directive::Invalid(ParseError::MissingSensorId)
        );
    }
}
