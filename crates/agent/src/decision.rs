//! Response interpreter: raw model text → [`Decision`].
//!
//! The model is asked to reply with exactly one JSON object:
//!
//! ```text
//! {"action": "<tool name>", "args": { ... }}
//! {"action": "final", "answer": "<text>"}
//! ```
//!
//! Parsing is strict first. If that fails, one bounded repair is applied:
//! typographic quotes are normalized, a Markdown code fence is unwrapped,
//! and the first well-formed `{...}` fragment is extracted from the
//! surrounding prose. If the repaired text still doesn't decode, the result
//! is a [`ParseFailure`]. The text is only ever parsed as inert JSON data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wizard_core::tool::ToolCall;

/// The structured outcome of one model consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    /// Invoke a capability.
    ToolCall(ToolCall),
    /// Stop and answer the user.
    FinalAnswer { text: String },
}

impl Decision {
    /// Short label for logs and events: the tool name, or `"final"`.
    pub fn label(&self) -> &str {
        match self {
            Self::ToolCall(call) => &call.name,
            Self::FinalAnswer { .. } => "final",
        }
    }
}

/// Model output that could not be interpreted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("could not interpret model output: {reason}")]
pub struct ParseFailure {
    /// The offending text, verbatim
    pub raw: String,
    pub reason: String,
}

/// A decision plus whether the repair path was needed to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub decision: Decision,
    pub repaired: bool,
}

/// Interpret raw model text as a decision.
pub fn interpret(raw: &str) -> Result<Decision, ParseFailure> {
    parse(raw).map(|p| p.decision)
}

/// Like [`interpret`], reporting whether repair was applied.
pub fn parse(raw: &str) -> Result<Parsed, ParseFailure> {
    let strict_err = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(obj)) => {
            // Well-formed JSON with the wrong shape is not something repair can fix.
            return decode(obj)
                .map(|decision| Parsed {
                    decision,
                    repaired: false,
                })
                .map_err(|reason| failure(raw, reason));
        }
        Ok(other) => format!("expected a JSON object, got {}", kind(&other)),
        Err(e) => e.to_string(),
    };

    match repair(raw) {
        Some(decoded) => decoded
            .map(|decision| Parsed {
                decision,
                repaired: true,
            })
            .map_err(|reason| failure(raw, reason)),
        None => Err(failure(raw, format!("no JSON object found ({strict_err})"))),
    }
}

fn failure(raw: &str, reason: String) -> ParseFailure {
    ParseFailure {
        raw: raw.to_string(),
        reason,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Turn a decoded object into a decision.
fn decode(mut obj: Map<String, Value>) -> Result<Decision, String> {
    let action = match obj.get("action") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(format!("\"action\" must be a string, got {}", kind(other))),
        // A bare {"answer": "..."} is unambiguous enough.
        None if obj.contains_key("answer") => "final".to_string(),
        None => return Err("missing \"action\" field".into()),
    };

    if action.is_empty() {
        return Err("\"action\" is empty".into());
    }

    if is_final(&action) {
        let text = match obj.remove("answer") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => return Err("final answer has no \"answer\" text".into()),
            Some(other) => other.to_string(),
        };
        if text.trim().is_empty() {
            return Err("final answer is empty".into());
        }
        return Ok(Decision::FinalAnswer { text });
    }

    let args = ["args", "arguments", "input"]
        .iter()
        .find_map(|key| obj.remove(*key))
        .unwrap_or(Value::Null);

    let arguments = match args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        // Some models double-encode the arguments.
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => map,
            _ => return Err(format!("\"args\" for {action} must be an object")),
        },
        other => {
            return Err(format!(
                "\"args\" for {action} must be an object, got {}",
                kind(&other)
            ));
        }
    };

    Ok(Decision::ToolCall(ToolCall::new(action, arguments)))
}

fn is_final(action: &str) -> bool {
    ["final", "final_answer", "answer"]
        .iter()
        .any(|f| action.eq_ignore_ascii_case(f))
}

/// The single repair attempt.
///
/// Every `{` is a candidate start, in order, so a stray brace in the prose
/// can't hide a later fragment. The first fragment that decodes wins; if
/// fragments parse but none decodes, the first one's error is reported.
fn repair(raw: &str) -> Option<Result<Decision, String>> {
    let normalized = normalize_quotes(raw);
    let body = strip_code_fence(&normalized).unwrap_or(&normalized);

    let mut first_err = None;
    for fragment in balanced_objects(body) {
        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(fragment) else {
            continue;
        };
        match decode(obj) {
            Ok(decision) => return Some(Ok(decision)),
            Err(reason) => {
                first_err.get_or_insert(reason);
            }
        }
    }
    first_err.map(Err)
}

fn normalize_quotes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            other => other,
        })
        .collect()
}

/// Contents of the first ``` fenced block, without its language tag.
fn strip_code_fence(s: &str) -> Option<&str> {
    let start = s.find("```")?;
    let after = &s[start + 3..];
    // Skip the info string ("json") up to the end of the opening line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

/// Balanced `{...}` fragments starting at each `{`, in order. Braces
/// inside JSON strings are ignored. A start that never closes is skipped.
fn balanced_objects(s: &str) -> impl Iterator<Item = &str> {
    let bytes = s.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'{')
        .filter_map(move |(start, _)| closing_brace(bytes, start).map(|end| &s[start..=end]))
}

/// Index of the `}` that balances the `{` at `start`.
fn closing_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_call(name: &str, args: Value) -> Decision {
        let Value::Object(map) = args else {
            panic!("args must be an object")
        };
        Decision::ToolCall(ToolCall::new(name, map))
    }

    #[test]
    fn strict_tool_call_echoes_name_and_args() {
        let parsed =
            parse(r#"{"action": "get_weather", "args": {"latitude": 40.7, "longitude": -74.0}}"#)
                .unwrap();
        assert!(!parsed.repaired);
        assert_eq!(
            parsed.decision,
            tool_call("get_weather", json!({"latitude": 40.7, "longitude": -74.0}))
        );
    }

    #[test]
    fn strict_final_answer() {
        let decision = interpret(r#"{"action":"final","answer":"Go hiking on Saturday."}"#).unwrap();
        assert_eq!(
            decision,
            Decision::FinalAnswer {
                text: "Go hiking on Saturday.".into()
            }
        );
        assert_eq!(decision.label(), "final");
    }

    #[test]
    fn prose_wrapped_fragment_is_repaired() {
        let raw = r#"Sure! I'll look that up first.
{"action": "trivia", "args": {}}
Then I'll answer."#;
        let parsed = parse(raw).unwrap();
        assert!(parsed.repaired);
        assert_eq!(parsed.decision, tool_call("trivia", json!({})));
    }

    #[test]
    fn code_fence_is_unwrapped() {
        let raw = "```json\n{\"action\": \"book_recs\", \"args\": {\"topic\": \"mystery\"}}\n```";
        let parsed = parse(raw).unwrap();
        assert!(parsed.repaired);
        assert_eq!(
            parsed.decision,
            tool_call("book_recs", json!({"topic": "mystery"}))
        );
    }

    #[test]
    fn smart_quotes_are_normalized() {
        let raw = "{\u{201C}action\u{201D}: \u{201C}random_dog\u{201D}, \u{201C}args\u{201D}: {}}";
        assert_eq!(interpret(raw).unwrap(), tool_call("random_dog", json!({})));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let raw = r#"Plan: {"action":"final","answer":"Use {braces} freely } really"} done"#;
        assert_eq!(
            interpret(raw).unwrap(),
            Decision::FinalAnswer {
                text: "Use {braces} freely } really".into()
            }
        );
    }

    #[test]
    fn first_well_formed_fragment_wins() {
        let raw = r#"I thought about {this} and then: {"action":"random_joke"}"#;
        assert_eq!(interpret(raw).unwrap(), tool_call("random_joke", json!({})));
    }

    #[test]
    fn unclosed_brace_in_prose_does_not_hide_a_later_fragment() {
        let raw = "I'll use the {city field next.\n{\"action\": \"trivia\", \"args\": {}}";
        let parsed = parse(raw).unwrap();
        assert!(parsed.repaired);
        assert_eq!(parsed.decision, tool_call("trivia", json!({})));
    }

    #[test]
    fn invalid_outer_braces_fall_back_to_inner_fragment() {
        let raw = r#"{Thought: call {"action": "trivia", "args": {}}}"#;
        assert_eq!(interpret(raw).unwrap(), tool_call("trivia", json!({})));
    }

    #[test]
    fn fragment_that_decodes_beats_an_earlier_object() {
        let raw = r#"Notes {"mood": "cozy"} then {"action": "random_dog"}"#;
        assert_eq!(interpret(raw).unwrap(), tool_call("random_dog", json!({})));
    }

    #[test]
    fn argument_aliases_and_double_encoding() {
        assert_eq!(
            interpret(r#"{"action":"city_to_coords","arguments":{"city":"Oslo"}}"#).unwrap(),
            tool_call("city_to_coords", json!({"city": "Oslo"}))
        );
        assert_eq!(
            interpret(r#"{"action":"city_to_coords","args":"{\"city\":\"Oslo\"}"}"#).unwrap(),
            tool_call("city_to_coords", json!({"city": "Oslo"}))
        );
    }

    #[test]
    fn bare_answer_object_is_final() {
        assert_eq!(
            interpret(r#"{"answer": "Relax at home."}"#).unwrap(),
            Decision::FinalAnswer {
                text: "Relax at home.".into()
            }
        );
    }

    #[test]
    fn unparseable_text_is_a_failure_with_raw_text() {
        let raw = "I think you should go outside.";
        let err = interpret(raw).unwrap_err();
        assert_eq!(err.raw, raw);
        assert!(err.reason.contains("no JSON object"));
    }

    #[test]
    fn wrong_shapes_are_failures() {
        assert!(interpret(r#"{"args": {}}"#).is_err());
        assert!(interpret(r#"{"action": "final"}"#).is_err());
        assert!(interpret(r#"{"action": "final", "answer": "  "}"#).is_err());
        assert!(interpret(r#"{"action": "trivia", "args": [1, 2]}"#).is_err());
        assert!(interpret(r#"{"action": 7}"#).is_err());
        assert!(interpret(r#"["final"]"#).is_err());
    }

    #[test]
    fn unterminated_object_is_a_failure() {
        let err = interpret(r#"{"action": "trivia", "args": {"#).unwrap_err();
        assert!(!err.reason.is_empty());
    }
}
