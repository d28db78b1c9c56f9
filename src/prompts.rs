//! System prompts and message builders for the language model.

use crate::llm::ChatMessage;

/// Persona used for plain chat when directives are disabled.
pub const AGENT_PROMPT: &str = "\
You are a live data agent connected to a time-series sensor database.
Answer questions about sensors, readings and metrics briefly and concretely.
Users can fetch data themselves with `list sensors`, `get sensor <id> window=15m`
or `!sensor sensor_id=<id> ...`; suggest those forms when live data is needed.
If a required input such as the sensor id is missing, ask one short follow-up question.";

/// Instruction asking the model to emit a tool directive when it needs data.
pub const DIRECTIVE_PROMPT: &str = r#"You are a precise assistant wired to a sensor database.

When a question genuinely needs live sensor data (readings, metadata, or aggregates),
respond with only this JSON, with no prose and no extra lines:

{
  "action": "call_query_sensor",
  "args": {
    "sensor_id": "<sensor id>",
    "query_type": "reading" | "description" | "agg",
    "limit": 100,
    "since_minutes": 15,
    "start_ts": null,
    "end_ts": null,
    "agg": "avg" | "min" | "max" | "count"
  }
}

Otherwise, answer normally in plain text.
Prefer calling the tool for requests like:
- last N readings for SENSOR_*
- avg/min/max of SENSOR_* over a time window
- what does SENSOR_* measure"#;

const TOOL_EXECUTED: &str = "Tool call executed. Use TOOL_RESULT_JSON to answer.";

pub fn chat_messages(input: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(AGENT_PROMPT), ChatMessage::user(input)]
}

pub fn directive_messages(input: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(DIRECTIVE_PROMPT), ChatMessage::user(input)]
}

/// Follow-up conversation asking the model to summarize a tool result.
pub fn summary_messages(input: &str, directive_reply: &str, tool_json: &str) -> Vec<ChatMessage> {
    // ---
    let mut messages = directive_messages(input);
    messages.extend([
        ChatMessage::assistant(directive_reply),
        ChatMessage::system(TOOL_EXECUTED),
        ChatMessage::user(format!(
            "TOOL_RESULT_JSON:\n{tool_json}\n\nWrite a concise, helpful answer."
        )),
    ]);
    messages
}
