//! Worker-flavour reasoning engine and the in-container worker loop
//!
//! The worker engine is strict: an unparseable model response becomes an
//! error observation and the loop continues. Termination is by
//! `final_answer` or the step cap.

use crate::context::{ActionCall, ContextStatus, ReasoningContext, ReasoningStep};
use crate::control::truncate_observation;
use crate::parser::{parse_response, ParsedResponse};
use raid_core::{ResultMessage, TaskMessage};
use raid_fabric::{should_deliver, Broker, CollabMessage, CollabMessageType, Dispatcher};
use raid_llm::{GenerateOptions, LlmBackend, LlmMessage};
use raid_profiles::Profile;
use raid_tools::ToolRegistry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared data received from collaborating workers, keyed `<sender>_<key>`.
#[derive(Default)]
pub struct CollabContext {
    entries: Mutex<HashMap<String, Value>>,
}

impl CollabContext {
    pub async fn store(&self, key: String, value: Value) {
        self.entries.lock().await.insert(key, value);
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Render for inclusion in the system prompt; empty when nothing shared.
    pub async fn render(&self) -> String {
        let entries = self.entries.lock().await;
        if entries.is_empty() {
            return String::new();
        }
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        let mut out = String::from("Collaboration context (data shared by other workers):\n");
        for key in keys {
            out.push_str(&format!("- {}: {}\n", key, entries[key]));
        }
        out
    }
}

pub struct WorkerEngine {
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    worker_name: String,
    base_system_prompt: String,
    max_steps: u32,
    collab: Option<Arc<CollabContext>>,
}

impl WorkerEngine {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        tools: Arc<ToolRegistry>,
        worker_name: impl Into<String>,
        system_prompt: impl Into<String>,
        max_steps: u32,
    ) -> Self {
        Self {
            backend,
            tools,
            worker_name: worker_name.into(),
            base_system_prompt: system_prompt.into(),
            max_steps,
            collab: None,
        }
    }

    pub fn with_collab(mut self, collab: Arc<CollabContext>) -> Self {
        self.collab = Some(collab);
        self
    }

    async fn system_prompt(&self) -> String {
        let tools_section = if self.tools.is_empty() {
            "No tools available.".to_string()
        } else {
            self.tools.describe_for_prompt()
        };

        let collab_section = match &self.collab {
            Some(collab) => {
                let rendered = collab.render().await;
                if rendered.is_empty() {
                    String::new()
                } else {
                    format!("\n\n{rendered}")
                }
            }
            None => String::new(),
        };

        format!(
            "{}\n\n\
             Available tools:\n{tools_section}\n\n\
             Use a Thought-Action-Observation cycle:\n\
             1. Thought: analyze the situation and plan the next action\n\
             2. Action: use a tool, or give your final answer\n\
             3. Observation: study the tool result and decide what to do next\n\n\
             To use a tool, respond with JSON in this format:\n\
             {{\n\
             \x20   \"thought\": \"your reasoning about what to do next\",\n\
             \x20   \"action\": {{\"tool\": \"tool_name\", \"parameters\": {{\"param\": \"value\"}}}}\n\
             }}\n\n\
             When the task is complete, respond with:\n\
             {{\n\
             \x20   \"thought\": \"I have completed the task\",\n\
             \x20   \"final_answer\": \"your complete answer\"\n\
             }}{collab_section}",
            self.base_system_prompt
        )
    }

    fn build_transcript(&self, system: &str, context: &ReasoningContext) -> Vec<LlmMessage> {
        let mut messages = vec![
            LlmMessage::system(system),
            LlmMessage::user(&context.goal),
        ];

        for step in &context.steps {
            let assistant = match &step.action {
                Some(action) if action.tool == "final_answer" => serde_json::json!({
                    "thought": step.thought,
                    "final_answer": action.param_str("answer").unwrap_or(""),
                }),
                Some(action) => serde_json::json!({
                    "thought": step.thought,
                    "action": action,
                }),
                None => serde_json::json!({ "thought": step.thought }),
            };
            messages.push(LlmMessage::assistant(assistant.to_string()));

            if let Some(observation) = &step.observation {
                messages.push(LlmMessage::user(format!("Observation: {observation}")));
            }
        }

        messages
    }

    /// Execute one task to completion and produce its result message.
    pub async fn process_task(&self, task: &TaskMessage) -> ResultMessage {
        let mut context = ReasoningContext::new(Some(task.task_id.clone()), &task.prompt);
        info!("worker '{}' starting task {}", self.worker_name, task.task_id);

        let system = self.system_prompt().await;

        for step_number in 1..=self.max_steps {
            let transcript = self.build_transcript(&system, &context);

            let response = match self
                .backend
                .generate(&transcript, &GenerateOptions::default())
                .await
            {
                Ok(r) => r,
                Err(e) if step_number == 1 => {
                    context.complete_failure(format!("model invocation failed: {e}"));
                    break;
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

            match parse_response(&response.content) {
                Ok(ParsedResponse::FinalAnswer { thought, answer }) => {
                    let step = ReasoningStep::thought(step_number, thought).with_action(
                        ActionCall::new("final_answer")
                            .with_param("answer", serde_json::json!(answer.clone())),
                    );
                    context.add_step(step);
                    context.complete_success(answer);
                    break;
                }
                Ok(ParsedResponse::Action { thought, action }) => {
                    debug!("step {}: {} -> {}", step_number, thought, action.tool);
                    let observation = self.execute_action(&action).await;
                    let observation = truncate_observation(&observation);

                    let mut step = ReasoningStep::thought(step_number, thought).with_action(action);
                    step.set_observation(observation);
                    context.add_step(step);
                }
                // Strict flavour: record the failure and keep going; the
                // error observation gives the model a chance to recover.
                Err(_) => {
                    let mut step = ReasoningStep::thought(
                        step_number,
                        format!(
                            "Received invalid, non-JSON response from the model: {}",
                            response.content
                        ),
                    );
                    step.set_observation(
                        "Error: the response was not valid JSON; reply using the documented format",
                    );
                    context.add_step(step);
                }
            }
        }

        if context.status == ContextStatus::InProgress {
            context.complete_failure(format!(
                "Reached max steps ({}) without completing the task",
                self.max_steps
            ));
        }

        match context.status {
            ContextStatus::Completed => ResultMessage::success(
                &task.task_id,
                &task.correlation_id,
                context.final_result.unwrap_or_else(|| "Completed".to_string()),
                None,
            ),
            _ => ResultMessage::error(
                &task.task_id,
                &task.correlation_id,
                context
                    .final_result
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
        }
    }

    async fn execute_action(&self, action: &ActionCall) -> String {
        let args = Value::Object(action.parameters.clone());
        let result = self.tools.execute(&action.tool, args).await;
        let observation = result.to_observation();

        // Calculator results feed the collaboration context automatically
        if action.tool == "calculator" && !result.is_error() {
            if let Some(collab) = &self.collab {
                collab
                    .store(
                        "last_calculation".to_string(),
                        serde_json::json!(observation.clone()),
                    )
                    .await;
            }
        }

        observation
    }
}

// ---------------------------------------------------------------------------
// Worker agent: queue loop + collaboration listener
// ---------------------------------------------------------------------------

pub struct WorkerAgent {
    profile: Profile,
    engine: WorkerEngine,
    dispatcher: Dispatcher,
    broker: Arc<dyn Broker>,
    collab: Option<WorkerCollab>,
}

struct WorkerCollab {
    group_id: String,
    context: Arc<CollabContext>,
}

impl WorkerAgent {
    pub fn new(
        profile: Profile,
        backend: Arc<dyn LlmBackend>,
        tools: ToolRegistry,
        broker: Arc<dyn Broker>,
        collaboration_group: Option<String>,
    ) -> Self {
        let collab = collaboration_group.map(|group_id| WorkerCollab {
            group_id,
            context: Arc::new(CollabContext::default()),
        });

        let mut engine = WorkerEngine::new(
            backend,
            Arc::new(tools),
            &profile.name,
            &profile.system_prompt,
            20,
        );
        if let Some(c) = &collab {
            engine = engine.with_collab(c.context.clone());
        }

        Self {
            profile,
            engine,
            dispatcher: Dispatcher::new(broker.clone()),
            broker,
            collab,
        }
    }

    /// Listen for tasks until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("worker '{}' listening for tasks", self.profile.name);

        if let Some(collab) = &self.collab {
            self.spawn_collab_listener(collab, cancel.clone()).await;
        }

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let task = match self
                .dispatcher
                .next_task(&self.profile.name, Duration::from_secs(5))
                .await
            {
                Ok(Some(task)) => task,
                Ok(None) => continue,
                Err(e) => {
                    warn!("task poll failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            debug!("received task {}", task.task_id);
            let result = self.engine.process_task(&task).await;
            if let Err(e) = self.dispatcher.send_result(&self.profile.name, &result).await {
                warn!("failed to send result for task {}: {}", task.task_id, e);
            }
        }

        info!("worker '{}' stopped", self.profile.name);
    }

    async fn spawn_collab_listener(&self, collab: &WorkerCollab, cancel: CancellationToken) {
        let channel = raid_fabric::collab_channel(&collab.group_id);
        let mut subscription = match self.broker.subscribe(&channel).await {
            Ok(s) => s,
            Err(e) => {
                warn!("could not subscribe to {}: {}", channel, e);
                return;
            }
        };

        let name = self.profile.name.clone();
        let group_id = collab.group_id.clone();
        let context = collab.context.clone();
        let broker = self.broker.clone();

        tokio::spawn(async move {
            info!("collaboration listener started for {}", channel);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    payload = subscription.recv() => {
                        let Some(payload) = payload else { break };
                        // Strict parse; malformed payloads are dropped
                        let message: CollabMessage = match serde_json::from_str(&payload) {
                            Ok(m) => m,
                            Err(e) => {
                                warn!("dropping malformed collaboration payload: {}", e);
                                continue;
                            }
                        };
                        if !should_deliver(&message, &name) {
                            continue;
                        }
                        handle_collab_message(&name, &group_id, &context, &*broker, message).await;
                    }
                }
            }
        });
    }
}

/// Per-type handling of an accepted collaboration message.
pub async fn handle_collab_message(
    worker_name: &str,
    group_id: &str,
    context: &CollabContext,
    broker: &dyn Broker,
    message: CollabMessage,
) {
    match message.message_type {
        CollabMessageType::DataShare => {
            if let Some(data) = &message.data {
                for (key, value) in data {
                    context
                        .store(format!("{}_{}", message.sender, key), value.clone())
                        .await;
                }
                debug!(
                    "stored shared data from {}: {:?}",
                    message.sender,
                    data.keys().collect::<Vec<_>>()
                );
            }
        }
        CollabMessageType::RequestData => {
            let Some(request) = &message.request else { return };
            // Best effort: answer calculation requests from local context
            if request.to_lowercase().contains("calculation") {
                if let Some(value) = context.get("last_calculation").await {
                    let mut data = HashMap::new();
                    data.insert("calculation_result".to_string(), value);
                    let mut reply = CollabMessage::data_share(
                        worker_name,
                        group_id,
                        data,
                        Some(&message.sender),
                    );
                    if let Some(correlation) = &message.correlation_id {
                        reply = reply.with_correlation_id(correlation.clone());
                    }
                    publish(broker, group_id, &reply).await;
                }
            }
        }
        CollabMessageType::StatusUpdate => {
            if let Some(status) = &message.status {
                context
                    .store(
                        format!("{}_status", message.sender),
                        serde_json::json!(status),
                    )
                    .await;
            }
        }
        CollabMessageType::Validation => {
            let mut data = HashMap::new();
            data.insert("validation_status".to_string(), serde_json::json!("reviewed"));
            data.insert("validation_agent".to_string(), serde_json::json!(worker_name));
            let mut reply =
                CollabMessage::data_share(worker_name, group_id, data, Some(&message.sender));
            if let Some(correlation) = &message.correlation_id {
                reply = reply.with_correlation_id(correlation.clone());
            }
            publish(broker, group_id, &reply).await;
        }
        // Delivered to the host for handling; no default action
        CollabMessageType::Coordination | CollabMessageType::ErrorReport => {
            info!(
                "{} message from {} left to host handling",
                if message.message_type == CollabMessageType::Coordination {
                    "coordination"
                } else {
                    "error_report"
                },
                message.sender
            );
        }
    }
}

async fn publish(broker: &dyn Broker, group_id: &str, message: &CollabMessage) {
    let channel = raid_fabric::collab_channel(group_id);
    match serde_json::to_string(message) {
        Ok(payload) => {
            if let Err(e) = broker.publish(&channel, &payload).await {
                warn!("failed to publish collaboration reply: {}", e);
            }
        }
        Err(e) => warn!("failed to serialize collaboration reply: {}", e),
    }
}
