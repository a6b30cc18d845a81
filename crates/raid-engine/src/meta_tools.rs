//! Meta-tools: the control loop's orchestration surface
//!
//! Meta-tools receive the execution context as an argument, so the registry
//! holds no reference back to the engine or the managers.

use raid_core::RaidConfig;
use raid_fabric::{CollabManager, Dispatcher, GroupRestrictions};
use raid_lifecycle::LifecycleSupervisor;
use raid_orchestrator::ContainerRuntime;
use raid_profiles::{DynamicWorkerManager, Profile, ProfileRegistry};
use raid_tools::ToolParameter;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Sentinel prefixes recognised by the control loop as conclusions.
pub const SUCCESS_SENTINEL: &str = "TASK_COMPLETED_SUCCESSFULLY: ";
pub const FAILURE_SENTINEL: &str = "TASK_FAILED: ";

/// Everything a meta-tool may touch, passed at execute time.
pub struct MetaToolContext {
    pub config: RaidConfig,
    pub profiles: Arc<ProfileRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub supervisor: Arc<LifecycleSupervisor>,
    pub collab: Arc<CollabManager>,
    pub dynamic: Arc<Mutex<DynamicWorkerManager>>,
}

impl MetaToolContext {
    /// Environment handed to every worker container.
    pub fn worker_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "RAID_LLM_PROVIDER".to_string(),
            self.config.llm.provider.clone(),
        );
        if let Some(key) = &self.config.llm.api_key {
            env.insert("OPENAI_API_KEY".to_string(), key.clone());
        }
        if let Some(url) = &self.config.llm.base_url {
            env.insert("RAID_OLLAMA_URL".to_string(), url.clone());
        }
        // Containers reach the host-side broker through the docker gateway
        env.insert(
            "RAID_REDIS_HOST".to_string(),
            "host.docker.internal".to_string(),
        );
        env.insert(
            "RAID_REDIS_PORT".to_string(),
            self.config.broker.port.to_string(),
        );
        env
    }

    /// Model options used for dynamically created profiles.
    fn dynamic_llm_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("provider".into(), Value::from(self.config.llm.provider.clone()));
        config.insert("model".into(), Value::from(self.config.llm.model.clone()));
        config.insert("max_tokens".into(), Value::from(1000));
        config.insert("temperature".into(), Value::from(0.3));
        config
    }
}

/// A tool exposed only to the control reasoning loop.
#[async_trait::async_trait]
pub trait MetaTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Vec<ToolParameter>;

    /// Execute with JSON parameters; the outcome is always observation text.
    async fn execute(&self, ctx: &MetaToolContext, params: &Map<String, Value>) -> String;
}

fn str_param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str()).filter(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// discover_profiles
// ---------------------------------------------------------------------------

pub struct DiscoverProfilesTool;

#[async_trait::async_trait]
impl MetaTool for DiscoverProfilesTool {
    fn name(&self) -> &str {
        "discover_profiles"
    }

    fn description(&self) -> &str {
        "Get the list of available worker profiles and their capabilities"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![]
    }

    async fn execute(&self, ctx: &MetaToolContext, _params: &Map<String, Value>) -> String {
        let profiles = ctx.profiles.all();
        if profiles.is_empty() {
            return "No worker profiles available.".to_string();
        }

        let mut names: Vec<&String> = profiles.keys().collect();
        names.sort();

        let mut out = String::from("Available worker profiles:\n");
        for name in names {
            let profile = &profiles[name];
            let model = profile
                .llm_config
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or("default");
            out.push_str(&format!(
                "\n- {} ({})\n  Description: {}\n  Tools: {}\n  Model: {}\n",
                name,
                profile.version,
                profile.description,
                profile.tools.join(", "),
                model
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// dispatch
// ---------------------------------------------------------------------------

pub struct DispatchTool;

#[async_trait::async_trait]
impl MetaTool for DispatchTool {
    fn name(&self) -> &str {
        "dispatch"
    }

    fn description(&self) -> &str {
        "Send a task to a worker with the given profile and wait for the result"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "profile",
                "string",
                "Name of the worker profile to use (e.g. 'calculator_agent')",
            ),
            ToolParameter::required("prompt", "string", "The task prompt to send to the worker"),
            ToolParameter::optional(
                "timeout",
                "integer",
                "Seconds to wait for the result (default 30)",
            ),
        ]
    }

    async fn execute(&self, ctx: &MetaToolContext, params: &Map<String, Value>) -> String {
        let Some(profile_name) = str_param(params, "profile") else {
            return "Error: profile and prompt are required".to_string();
        };
        let Some(prompt) = str_param(params, "prompt") else {
            return "Error: profile and prompt are required".to_string();
        };
        let timeout = params
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(30);

        let profile = match ctx.profiles.load(profile_name) {
            Ok(p) => p,
            Err(_) => return format!("Error: worker profile '{profile_name}' not found"),
        };

        let handle = match ctx.runtime.ensure_running(&profile, &ctx.worker_env()).await {
            Ok(h) => h,
            Err(e) => return format!("Error starting worker container: {e}"),
        };

        if ctx.supervisor.get(&profile.name).await.is_none() {
            if let Err(e) = ctx
                .supervisor
                .register(&profile.name, &handle, &profile.name, profile.lifecycle())
                .await
            {
                return format!("Error: cannot admit worker '{}': {e}", profile.name);
            }
        }

        let task = raid_core::TaskMessage::new(
            &profile.name,
            prompt,
            profile.tools.clone(),
            profile.llm_config.clone(),
        );

        ctx.supervisor.mark_task_started(&profile.name).await;
        let result = ctx
            .dispatcher
            .dispatch(&task, Duration::from_secs(timeout))
            .await;

        match result.status {
            raid_core::ResultStatus::Success => {
                ctx.supervisor.mark_task_completed(&profile.name).await;
                format!("Worker result: {}", result.result.unwrap_or_default())
            }
            raid_core::ResultStatus::Error => {
                ctx.supervisor.mark_error(&profile.name).await;
                format!("Worker error: {}", result.error.unwrap_or_default())
            }
            raid_core::ResultStatus::Timeout => {
                format!("Timeout: no result from {profile_name} within {timeout} seconds")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// create_specialized_worker
// ---------------------------------------------------------------------------

pub struct CreateSpecializedWorkerTool;

#[async_trait::async_trait]
impl MetaTool for CreateSpecializedWorkerTool {
    fn name(&self) -> &str {
        "create_specialized_worker"
    }

    fn description(&self) -> &str {
        "Create a new specialized worker profile with a specific role for a particular task"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "task_description",
                "string",
                "Detailed description of the task the worker will handle",
            ),
            ToolParameter::optional(
                "role",
                "string",
                "Role template: 'data_analyst', 'financial_analyst', 'research_analyst', \
                 'problem_solver', or 'quality_analyst'. Auto-suggested when omitted.",
            ),
            ToolParameter::optional(
                "specialization_notes",
                "string",
                "Additional notes about the specialization needed",
            ),
        ]
    }

    async fn execute(&self, ctx: &MetaToolContext, params: &Map<String, Value>) -> String {
        let Some(task_description) = str_param(params, "task_description") else {
            return "Error: task_description is required".to_string();
        };
        let role = str_param(params, "role");

        let mut full_task = task_description.to_string();
        if let Some(notes) = str_param(params, "specialization_notes") {
            full_task.push_str(&format!(" Additional requirements: {notes}"));
        }

        let mut dynamic = ctx.dynamic.lock().await;
        let profile = match dynamic.create(&full_task, role, ctx.dynamic_llm_config()) {
            Ok(p) => p,
            Err(e) => return format!("Error: {e}"),
        };

        if let Err(e) = ctx.profiles.save(&profile) {
            dynamic.remove(&profile.name);
            return format!("Error saving worker profile: {e}");
        }

        let info = dynamic.get(&profile.name).expect("just created");
        info!("created specialized worker profile '{}'", profile.name);

        format!(
            "Created specialized worker: '{}'\n\
             Role: {}\n\
             Specialization: {}\n\
             Available tools: {}\n\n\
             Dispatch tasks to it with the 'dispatch' tool using profile='{}'.\n\
             Dynamic worker usage: {}/{}",
            profile.name,
            info.role,
            profile.description,
            profile.tools.join(", "),
            profile.name,
            dynamic.active_count(),
            dynamic.max_workers()
        )
    }
}

// ---------------------------------------------------------------------------
// create_collaborative_group
// ---------------------------------------------------------------------------

pub struct CreateCollaborativeGroupTool;

#[async_trait::async_trait]
impl MetaTool for CreateCollaborativeGroupTool {
    fn name(&self) -> &str {
        "create_collaborative_group"
    }

    fn description(&self) -> &str {
        "Create a group of specialized workers that share data over a restricted channel"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "group_task_description",
                "string",
                "The complex task that needs multiple collaborating workers",
            ),
            ToolParameter::required(
                "agent_roles",
                "string",
                "Comma-separated roles (e.g. 'financial_analyst,data_analyst,quality_analyst')",
            ),
            ToolParameter::required(
                "collaboration_type",
                "string",
                "'data_sharing', 'validation_chain', 'parallel_analysis', or 'sequential_workflow'",
            ),
            ToolParameter::optional(
                "shared_data_keys",
                "string",
                "Comma-separated allow-list of data keys (e.g. 'calculations,results')",
            ),
        ]
    }

    async fn execute(&self, ctx: &MetaToolContext, params: &Map<String, Value>) -> String {
        let Some(task) = str_param(params, "group_task_description") else {
            return "Error: group_task_description and agent_roles are required".to_string();
        };
        let Some(roles_raw) = str_param(params, "agent_roles") else {
            return "Error: group_task_description and agent_roles are required".to_string();
        };
        let mode = str_param(params, "collaboration_type").unwrap_or("data_sharing");

        let roles: Vec<String> = roles_raw
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if roles.len() < 2 {
            return "Error: at least 2 roles are required for collaboration".to_string();
        }

        let data_keys: Option<HashSet<String>> = str_param(params, "shared_data_keys").map(|raw| {
            raw.split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        });

        let mut dynamic = ctx.dynamic.lock().await;
        let free_slots = ctx
            .config
            .max_workers
            .saturating_sub(dynamic.active_count());
        if roles.len() > free_slots {
            return format!(
                "Error: only {} worker slot(s) available, requested {}",
                free_slots,
                roles.len()
            );
        }

        let restrictions = GroupRestrictions::for_mode(mode, data_keys.clone());
        let group = ctx
            .collab
            .create_group(&format!("collaborative_group_{mode}"), restrictions)
            .await;

        let mut created: Vec<Profile> = Vec::new();
        for role in &roles {
            let enhanced_task = format!(
                "{task}\n\nCollaboration context: you are part of a {}-worker group with \
                 roles {}. Your role is '{role}'. Share data and coordinate with the other \
                 workers in your group.",
                roles.len(),
                roles.join(", ")
            );

            let profile = match dynamic.create(&enhanced_task, Some(role), ctx.dynamic_llm_config())
            {
                Ok(p) => p,
                Err(e) => {
                    for p in &created {
                        dynamic.remove(&p.name);
                        let _ = ctx.profiles.remove(&p.name);
                    }
                    return format!("Error creating worker with role '{role}': {e}");
                }
            };

            if let Err(e) = ctx.profiles.save(&profile) {
                dynamic.remove(&profile.name);
                for p in &created {
                    dynamic.remove(&p.name);
                    let _ = ctx.profiles.remove(&p.name);
                }
                return format!("Error saving profile for role '{role}': {e}");
            }

            group.add_member(&profile.name, role, None).await;
            created.push(profile);
        }
        drop(dynamic);

        // Bring up the containers with collaboration enabled
        let mut env = ctx.worker_env();
        env.insert("RAID_COLLABORATION_ENABLED".to_string(), "true".to_string());
        env.insert(
            "RAID_COLLABORATION_GROUP_ID".to_string(),
            group.group_id.clone(),
        );

        for profile in &created {
            let handle = match ctx.runtime.ensure_running(profile, &env).await {
                Ok(h) => h,
                Err(e) => return format!("Error starting container for {}: {e}", profile.name),
            };
            if ctx.supervisor.get(&profile.name).await.is_none() {
                if let Err(e) = ctx
                    .supervisor
                    .register(&profile.name, &handle, &profile.name, profile.lifecycle())
                    .await
                {
                    return format!("Error: cannot admit worker '{}': {e}", profile.name);
                }
            }
        }

        let restrictions = group.restrictions();
        let mut out = format!(
            "Created collaborative worker group: '{}'\n\
             Collaboration type: {mode}\n\
             Task: {task}\n\nWorkers:\n",
            group.group_id
        );
        for (profile, role) in created.iter().zip(&roles) {
            out.push_str(&format!("  - {} (role: {role})\n", profile.name));
        }
        out.push_str(&format!(
            "\nChannel restrictions:\n  - Max messages/minute: {}\n  - Message size limit: {} bytes\n",
            restrictions.max_messages_per_minute, restrictions.max_message_size_bytes
        ));
        if let Some(keys) = &data_keys {
            let mut keys: Vec<&String> = keys.iter().collect();
            keys.sort();
            out.push_str(&format!(
                "  - Allowed data keys: {}\n",
                keys.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }
        out.push_str(&format!(
            "\nDispatch tasks to any member with the 'dispatch' tool. Group id: {}",
            group.group_id
        ));
        out
    }
}

// ---------------------------------------------------------------------------
// conclude_success / conclude_failure
// ---------------------------------------------------------------------------

pub struct ConcludeSuccessTool;

#[async_trait::async_trait]
impl MetaTool for ConcludeSuccessTool {
    fn name(&self) -> &str {
        "conclude_success"
    }

    fn description(&self) -> &str {
        "Mark the current goal as completed successfully with a final summary"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "final_summary",
            "string",
            "A comprehensive summary of what was accomplished",
        )]
    }

    async fn execute(&self, _ctx: &MetaToolContext, params: &Map<String, Value>) -> String {
        let summary = str_param(params, "final_summary").unwrap_or("Task completed successfully.");
        format!("{SUCCESS_SENTINEL}{summary}")
    }
}

pub struct ConcludeFailureTool;

#[async_trait::async_trait]
impl MetaTool for ConcludeFailureTool {
    fn name(&self) -> &str {
        "conclude_failure"
    }

    fn description(&self) -> &str {
        "Mark the current goal as failed with an explanation"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "reason",
            "string",
            "Explanation of why the goal failed",
        )]
    }

    async fn execute(&self, _ctx: &MetaToolContext, params: &Map<String, Value>) -> String {
        let reason = str_param(params, "reason").unwrap_or("Task failed for unknown reason.");
        format!("{FAILURE_SENTINEL}{reason}")
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct MetaToolRegistry {
    tools: std::collections::HashMap<String, Arc<dyn MetaTool>>,
}

impl Default for MetaToolRegistry {
    fn default() -> Self {
        Self::with_default_tools()
    }
}

impl MetaToolRegistry {
    pub fn empty() -> Self {
        Self {
            tools: Default::default(),
        }
    }

    pub fn with_default_tools() -> Self {
        let mut registry = Self::empty();
        registry.register(DiscoverProfilesTool);
        registry.register(DispatchTool);
        registry.register(CreateSpecializedWorkerTool);
        registry.register(CreateCollaborativeGroupTool);
        registry.register(ConcludeSuccessTool);
        registry.register(ConcludeFailureTool);
        registry
    }

    pub fn register(&mut self, tool: impl MetaTool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        ctx: &MetaToolContext,
        params: &Map<String, Value>,
    ) -> String {
        match self.tools.get(name) {
            Some(tool) => tool.execute(ctx, params).await,
            None => format!("Error: tool '{name}' not found"),
        }
    }

    /// Tool descriptions for the control system prompt.
    pub fn describe_for_prompt(&self) -> String {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();

        let mut lines = Vec::new();
        for name in names {
            let tool = &self.tools[name];
            let params = tool
                .parameters()
                .iter()
                .map(|p| format!("{} ({}): {}", p.name, p.kind, p.description))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "- {}: {}\n  Parameters: {}",
                tool.name(),
                tool.description(),
                if params.is_empty() { "none" } else { &params }
            ));
        }
        lines.join("\n")
    }
}
