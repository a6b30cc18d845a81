//! Tolerant fallback for unparseable control-side responses
//!
//! Some models answer in plain prose despite the JSON instructions. The
//! control flavour salvages these; the worker flavour deliberately does not.

use crate::context::ActionCall;
use crate::parser::ParsedResponse;
use regex::Regex;
use std::sync::OnceLock;

fn multiplication() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\s*[×*x]\s*\d+").expect("multiplication regex"))
}

fn equation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\s*=\s*\$?\d+").expect("equation regex"))
}

/// Does the text read like a direct answer to the user's question?
pub fn is_direct_answer(content: &str) -> bool {
    let lower = content.to_lowercase();
    let lower = lower.trim();

    if ["$", "tip", "percent", "%", "="].iter().any(|p| lower.contains(p)) {
        return true;
    }
    if ["the answer is", "result:", "solution:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        return true;
    }
    multiplication().is_match(content) || equation().is_match(content)
}

/// Does the text ask for clarification or more information?
pub fn needs_more_info(content: &str) -> bool {
    let lower = content.to_lowercase();
    ["?", "what", "which", "how", "need to know", "clarify", "specify"]
        .iter()
        .any(|p| lower.contains(p))
}

/// Salvage an unparseable control response into a usable step.
pub fn salvage(raw: &str) -> ParsedResponse {
    let content = raw.trim();

    if is_direct_answer(content) {
        return ParsedResponse::Action {
            thought: format!("The model provided a direct answer: {content}"),
            action: ActionCall::new("conclude_success")
                .with_param("final_summary", serde_json::json!(content)),
        };
    }

    if needs_more_info(content) {
        return ParsedResponse::Action {
            thought: format!("Need to gather more information: {content}"),
            action: ActionCall::new("discover_profiles"),
        };
    }

    ParsedResponse::Action {
        thought: content.to_string(),
        action: ActionCall::new("discover_profiles"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_text_is_direct_answer() {
        assert!(is_direct_answer("The tip is $12.75."));
        assert!(is_direct_answer("15 percent of 85 = 12.75"));
        assert!(is_direct_answer("the answer is twelve"));
        assert!(is_direct_answer("5 x 3 makes fifteen"));
    }

    #[test]
    fn neutral_prose_is_not_direct_answer() {
        assert!(!is_direct_answer("Let me look into the available workers."));
    }

    #[test]
    fn questions_need_more_info() {
        assert!(needs_more_info("Which currency should I use?"));
        assert!(needs_more_info("I need to know the amount"));
        assert!(!needs_more_info("Dispatching now."));
    }

    #[test]
    fn salvage_direct_answer_concludes() {
        let parsed = salvage("The tip is $12.75.");
        match parsed {
            ParsedResponse::Action { action, .. } => {
                assert_eq!(action.tool, "conclude_success");
                assert!(action
                    .param_str("final_summary")
                    .unwrap()
                    .contains("12.75"));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn salvage_default_discovers() {
        let parsed = salvage("I will now coordinate the sub tasks in sequence.");
        match parsed {
            ParsedResponse::Action { action, thought } => {
                assert_eq!(action.tool, "discover_profiles");
                assert!(thought.contains("coordinate"));
            }
            _ => panic!(),
        }
    }
}
