//! Structured response extraction
//!
//! Models are asked for JSON but return it in many wrappers. Three attempts,
//! in order: strict parse, fenced ```json block, first `{...}` span in
//! surrounding prose.

use crate::context::ActionCall;
use raid_core::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// A successfully extracted response.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedResponse {
    Action { thought: String, action: ActionCall },
    FinalAnswer { thought: String, answer: String },
}

impl ParsedResponse {
    pub fn thought(&self) -> &str {
        match self {
            Self::Action { thought, .. } => thought,
            Self::FinalAnswer { thought, .. } => thought,
        }
    }
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*\n(.*?)\n\s*```").expect("fenced regex"))
}

/// Extract thought + action (or final answer) from raw model output.
pub fn parse_response(raw: &str) -> Result<ParsedResponse> {
    let content = raw.trim();

    let value = strict(content)
        .or_else(|| fenced(content))
        .or_else(|| brace_span(content))
        .ok_or_else(|| Error::Parse("no JSON object found in model output".to_string()))?;

    interpret(value)
}

fn strict(content: &str) -> Option<serde_json::Value> {
    serde_json::from_str(content).ok().filter(is_object)
}

fn fenced(content: &str) -> Option<serde_json::Value> {
    let captures = fenced_block().captures(content)?;
    serde_json::from_str(captures.get(1)?.as_str()).ok().filter(is_object)
}

fn brace_span(content: &str) -> Option<serde_json::Value> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok().filter(is_object)
}

fn is_object(value: &serde_json::Value) -> bool {
    value.is_object()
}

fn interpret(value: serde_json::Value) -> Result<ParsedResponse> {
    let object = value.as_object().expect("object checked by caller");
    let thought = object
        .get("thought")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    if let Some(answer) = object.get("final_answer") {
        let answer = answer
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| answer.to_string());
        return Ok(ParsedResponse::FinalAnswer { thought, answer });
    }

    if let Some(action) = object.get("action") {
        let action: ActionCall = serde_json::from_value(action.clone())
            .map_err(|e| Error::Parse(format!("malformed action: {e}")))?;
        return Ok(ParsedResponse::Action { thought, action });
    }

    Err(Error::Parse(
        "response has neither an action nor a final_answer".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_action() {
        let raw = r#"{"thought": "use the calculator", "action": {"tool": "calculator", "parameters": {"expression": "2+2"}}}"#;
        let parsed = parse_response(raw).unwrap();
        match parsed {
            ParsedResponse::Action { thought, action } => {
                assert_eq!(thought, "use the calculator");
                assert_eq!(action.tool, "calculator");
                assert_eq!(action.param_str("expression"), Some("2+2"));
            }
            _ => panic!("expected action"),
        }
    }

    #[test]
    fn fenced_block_json() {
        let raw = "Here is my plan:\n```json\n{\"thought\": \"t\", \"action\": {\"tool\": \"discover_profiles\", \"parameters\": {}}}\n```\nDone.";
        let parsed = parse_response(raw).unwrap();
        assert!(matches!(parsed, ParsedResponse::Action { .. }));
    }

    #[test]
    fn bare_object_in_prose() {
        let raw = "Sure! {\"thought\": \"t\", \"final_answer\": \"42\"} hope that helps";
        let parsed = parse_response(raw).unwrap();
        match parsed {
            ParsedResponse::FinalAnswer { answer, .. } => assert_eq!(answer, "42"),
            _ => panic!("expected final answer"),
        }
    }

    #[test]
    fn final_answer_wins_over_missing_action() {
        let raw = r#"{"thought": "done", "final_answer": "the result is 8"}"#;
        let parsed = parse_response(raw).unwrap();
        assert!(matches!(parsed, ParsedResponse::FinalAnswer { .. }));
    }

    #[test]
    fn plain_text_fails() {
        assert!(parse_response("The tip is $12.75.").is_err());
        assert!(parse_response("").is_err());
    }

    #[test]
    fn object_without_action_or_answer_fails() {
        assert!(parse_response(r#"{"thought": "hmm"}"#).is_err());
    }

    #[test]
    fn action_parameters_default_to_empty() {
        let raw = r#"{"thought": "t", "action": {"tool": "discover_profiles"}}"#;
        let parsed = parse_response(raw).unwrap();
        match parsed {
            ParsedResponse::Action { action, .. } => assert!(action.parameters.is_empty()),
            _ => panic!(),
        }
    }
}
