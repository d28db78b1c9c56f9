//! Input classification: explicit commands, fixed phrases and model directives.
//!
//! Each syntax has its own parser returning either a normalized request or a
//! typed [`ParseError`]. Nothing here touches the database or the model.

mod args;
mod command;
mod directive;
mod patterns;

pub use command::{is_command, parse_command, COMMAND_PREFIX, USAGE};
pub use directive::{extract_json_object, parse_directive, Directive, DIRECTIVE_ACTION};
pub use patterns::{match_pattern, PatternMatch};

use crate::error::ParseError;
use crate::models::ToolRequest;

// ---

/// Which surface syntax an input was recognized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Command,
    Pattern,
    Directive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Tool(ToolRequest),
    Invalid { syntax: Syntax, error: ParseError },
}

/// Classify raw input without consulting the model.
///
/// `None` means the input is not a local data request and should go on to
/// the directive stage or plain chat.
pub fn classify(input: &str) -> Option<Intent> {
    // ---
    if let Some(parsed) = parse_command(input) {
        return Some(match parsed {
            Ok(request) => Intent::Tool(ToolRequest::QuerySensor(request)),
            Err(error) => Intent::Invalid {
                syntax: Syntax::Command,
                error,
            },
        });
    }

    match match_pattern(input)? {
        PatternMatch::ListSensors => Some(Intent::Tool(ToolRequest::ListSensors)),
        PatternMatch::QuerySensor(Ok(request)) => {
            Some(Intent::Tool(ToolRequest::QuerySensor(request)))
        }
        PatternMatch::QuerySensor(Err(error)) => Some(Intent::Invalid {
            syntax: Syntax::Pattern,
            error,
        }),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_command_takes_precedence() {
        // ---
        let intent = classify("!sensor sensor_id=A").unwrap();
        assert!(matches!(intent, Intent::Tool(ToolRequest::QuerySensor(ref r)) if r.sensor_id == "A"));
    }

    #[test]
    fn test_list_sensors_phrase() {
        // ---
        assert_eq!(
            classify("list sensors"),
            Some(Intent::Tool(ToolRequest::ListSensors))
        );
    }

    #[test]
    fn test_invalid_inputs_keep_their_syntax() {
        // ---
        assert!(matches!(
            classify("!sensor"),
            Some(Intent::Invalid { syntax: Syntax::Command, .. })
        ));
        assert!(matches!(
            classify("get sensor X window=10y"),
            Some(Intent::Invalid { syntax: Syntax::Pattern, .. })
        ));
    }

    #[test]
    fn test_chat_is_unclassified() {
        // ---
        assert_eq!(classify("how warm is the boiler room today?"), None);
        assert_eq!(classify(""), None);
    }
}
