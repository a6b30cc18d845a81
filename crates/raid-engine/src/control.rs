//! Control-flavour reasoning engine
//!
//! Drives meta-tools against the orchestration managers until a conclusion
//! sentinel or the step cap. Parse failures are salvaged (tolerant flavour);
//! model failures after the first step become observations.

use crate::context::{ReasoningContext, ReasoningStep};
use crate::fallback;
use crate::meta_tools::{MetaToolContext, MetaToolRegistry, FAILURE_SENTINEL, SUCCESS_SENTINEL};
use crate::parser::{parse_response, ParsedResponse};
use raid_llm::{GenerateOptions, LlmBackend, LlmMessage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Observations longer than this are cut to first and last halves.
pub const OBSERVATION_CAP: usize = 15_000;

/// Truncate an observation that exceeds the cap, keeping both ends.
pub fn truncate_observation(observation: &str) -> String {
    if observation.len() <= OBSERVATION_CAP {
        return observation.to_string();
    }
    let half = OBSERVATION_CAP / 2;
    let head_end = observation
        .char_indices()
        .take_while(|(i, _)| *i <= half)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail_start = observation
        .char_indices()
        .find(|(i, _)| *i >= observation.len() - half)
        .map(|(i, _)| i)
        .unwrap_or(observation.len());
    format!(
        "{}\n\n... [OUTPUT TRUNCATED] ...\n\n{}",
        &observation[..head_end],
        &observation[tail_start..]
    )
}

pub struct ControlEngine {
    backend: Arc<dyn LlmBackend>,
    registry: Arc<MetaToolRegistry>,
    max_steps: u32,
}

impl ControlEngine {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        registry: Arc<MetaToolRegistry>,
        max_steps: u32,
    ) -> Self {
        Self {
            backend,
            registry,
            max_steps,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are the control agent of a multi-worker orchestration system. You \
             decompose user goals into sub-tasks, assign them to the most appropriate \
             workers, monitor execution, and conclude with a final summary.\n\n\
             Always begin by executing 'discover_profiles' to learn the available \
             workers, and prefer existing profiles over creating new ones. Create \
             specialized workers only when no existing profile fits; create a \
             collaborative group only when the task genuinely needs several workers \
             exchanging data.\n\n\
             Available meta-tools:\n{}\n\n\
             Respond with JSON in exactly this format:\n\
             {{\n\
             \x20   \"thought\": \"your analysis and reasoning\",\n\
             \x20   \"action\": {{\n\
             \x20       \"tool\": \"meta_tool_name\",\n\
             \x20       \"parameters\": {{\"param1\": \"value1\"}}\n\
             \x20   }}\n\
             }}\n\n\
             Finish with 'conclude_success' (final_summary) once the goal is \
             achieved, or 'conclude_failure' (reason) when it cannot be.",
            self.registry.describe_for_prompt()
        )
    }

    fn build_transcript(&self, context: &ReasoningContext) -> Vec<LlmMessage> {
        let mut messages = vec![
            LlmMessage::system(self.system_prompt()),
            LlmMessage::user(format!(
                "Goal: {}\n\nPlease think about this goal and decide on your first action.",
                context.goal
            )),
        ];

        for step in &context.steps {
            if let (Some(action), Some(observation)) = (&step.action, &step.observation) {
                let assistant = serde_json::json!({
                    "thought": step.thought,
                    "action": action,
                });
                messages.push(LlmMessage::assistant(
                    serde_json::to_string_pretty(&assistant).unwrap_or_default(),
                ));
                messages.push(LlmMessage::user(format!("Observation: {observation}")));
            }
        }

        if !context.steps.is_empty() {
            messages.push(LlmMessage::user(
                "Based on the previous observations, what is your next thought and action?",
            ));
        }

        messages
    }

    /// Process a goal through reasoning cycles until conclusion or step cap.
    pub async fn process_goal(
        &self,
        ctx: &MetaToolContext,
        goal: &str,
        task_id: Option<String>,
    ) -> ReasoningContext {
        let mut context = ReasoningContext::new(task_id, goal);
        info!("processing goal (task {}): {}", context.task_id, goal);

        for step_number in 1..=self.max_steps {
            let transcript = self.build_transcript(&context);

            let response = match self
                .backend
                .generate(&transcript, &GenerateOptions::default())
                .await
            {
                Ok(r) => r,
                Err(e) if step_number == 1 => {
                    // Nothing to salvage before the first step exists
                    context.complete_failure(format!("model invocation failed: {e}"));
                    return context;
                }
                Err(e) => {
                    warn!("model invocation failed at step {}: {}", step_number, e);
                    let mut step =
                        ReasoningStep::thought(step_number, "Model invocation failed".to_string());
                    step.set_observation(format!("Error: {e}"));
                    context.add_step(step);
                    continue;
                }
            };

            let parsed = match parse_response(&response.content) {
                Ok(p) => p,
                Err(_) => {
                    debug!("unparseable control response, applying tolerant fallback");
                    fallback::salvage(&response.content)
                }
            };

            let (thought, action) = match parsed {
                ParsedResponse::Action { thought, action } => (thought, action),
                // The control schema has no final_answer shape; treat the
                // answer text as a conclusion summary.
                ParsedResponse::FinalAnswer { thought, answer } => (
                    thought,
                    crate::context::ActionCall::new("conclude_success")
                        .with_param("final_summary", serde_json::json!(answer)),
                ),
            };

            debug!("step {}: {} -> {}", step_number, thought, action.tool);
            let observation = self
                .registry
                .execute(&action.tool, ctx, &action.parameters)
                .await;
            let observation = truncate_observation(&observation);

            let mut step = ReasoningStep::thought(step_number, thought).with_action(action);
            step.set_observation(observation.clone());
            context.add_step(step);

            if let Some(summary) = observation.strip_prefix(SUCCESS_SENTINEL) {
                context.complete_success(summary.to_string());
                info!("goal completed in {} step(s)", step_number);
                return context;
            }
            if let Some(reason) = observation.strip_prefix(FAILURE_SENTINEL) {
                context.complete_failure(reason.to_string());
                info!("goal failed after {} step(s): {}", step_number, reason);
                return context;
            }
        }

        context.complete_failure(format!(
            "Maximum steps ({}) reached without completion",
            self.max_steps
        ));
        warn!("goal hit the step cap of {}", self.max_steps);
        context
    }
}
