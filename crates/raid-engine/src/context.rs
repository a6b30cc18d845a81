//! Reasoning context and steps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tool invocation extracted from model output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActionCall {
    pub tool: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl ActionCall {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            parameters: Default::default(),
        }
    }

    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

/// One step of the Thought-Action-Observation cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based, monotonic within a context.
    pub step_number: u32,
    pub thought: String,
    pub action: Option<ActionCall>,
    pub observation: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReasoningStep {
    pub fn thought(step_number: u32, thought: impl Into<String>) -> Self {
        Self {
            step_number,
            thought: thought.into(),
            action: None,
            observation: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: ActionCall) -> Self {
        self.action = Some(action);
        self
    }

    pub fn set_observation(&mut self, observation: impl Into<String>) {
        self.observation = Some(observation.into());
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    InProgress,
    Completed,
    Failed,
}

/// A reasoning run. Steps are append-only; once the status leaves
/// `InProgress` the context is immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningContext {
    pub task_id: String,
    pub goal: String,
    pub steps: Vec<ReasoningStep>,
    pub status: ContextStatus,
    pub final_result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReasoningContext {
    pub fn new(task_id: Option<String>, goal: impl Into<String>) -> Self {
        Self {
            task_id: task_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            goal: goal.into(),
            steps: Vec::new(),
            status: ContextStatus::InProgress,
            final_result: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != ContextStatus::InProgress
    }

    /// Next step number (1-based).
    pub fn next_step_number(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    /// Append a step. Refused once the context is terminal.
    pub fn add_step(&mut self, step: ReasoningStep) -> bool {
        if self.is_terminal() {
            tracing::warn!(
                "ignoring step {} appended to terminal context {}",
                step.step_number,
                self.task_id
            );
            return false;
        }
        self.steps.push(step);
        true
    }

    pub fn last_step_mut(&mut self) -> Option<&mut ReasoningStep> {
        if self.is_terminal() {
            return None;
        }
        self.steps.last_mut()
    }

    pub fn complete_success(&mut self, result: impl Into<String>) {
        if !self.is_terminal() {
            self.status = ContextStatus::Completed;
            self.final_result = Some(result.into());
        }
    }

    pub fn complete_failure(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.status = ContextStatus::Failed;
            self.final_result = Some(reason.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_number_monotonically() {
        let mut ctx = ReasoningContext::new(None, "goal");
        for expected in 1..=3 {
            assert_eq!(ctx.next_step_number(), expected);
            ctx.add_step(ReasoningStep::thought(expected, "thinking"));
        }
        for (i, step) in ctx.steps.iter().enumerate() {
            assert_eq!(step.step_number as usize, i + 1);
        }
        // Timestamps never go backwards
        for pair in ctx.steps.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn terminal_context_refuses_steps() {
        let mut ctx = ReasoningContext::new(None, "goal");
        ctx.add_step(ReasoningStep::thought(1, "t"));
        ctx.complete_success("done");

        assert!(!ctx.add_step(ReasoningStep::thought(2, "late")));
        assert_eq!(ctx.steps.len(), 1);
        assert!(ctx.last_step_mut().is_none());

        // Terminal status cannot be overwritten either
        ctx.complete_failure("whoops");
        assert_eq!(ctx.status, ContextStatus::Completed);
        assert_eq!(ctx.final_result.as_deref(), Some("done"));
    }

    #[test]
    fn fresh_context_has_uuid_task_id() {
        let a = ReasoningContext::new(None, "g");
        let b = ReasoningContext::new(None, "g");
        assert_ne!(a.task_id, b.task_id);

        let fixed = ReasoningContext::new(Some("t-1".to_string()), "g");
        assert_eq!(fixed.task_id, "t-1");
    }
}
