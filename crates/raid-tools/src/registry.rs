//! Tool registry and trait definitions
//!
//! Tool errors are observation text, never panics: the reasoning loop feeds
//! whatever a tool returns straight back to the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Parameter description shown to the model. Schemas are data, not code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    /// "string", "integer", "number", "boolean"
    pub kind: String,
    pub description: String,
    pub required: bool,
}

impl ToolParameter {
    pub fn required(name: &str, kind: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, kind: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Error(String),
}

impl ToolResult {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Self::Error(s.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Render as the observation string the reasoning loop records.
    pub fn to_observation(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Error(e) => format!("Error: {}", e),
        }
    }
}

/// The Tool trait — implement this to add a worker capability.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "calculator", "run_bash_command").
    fn name(&self) -> &str;

    /// Human-readable description sent to the model.
    fn description(&self) -> &str;

    /// Parameter descriptions for the system prompt.
    fn parameters(&self) -> Vec<ToolParameter>;

    /// Execute with JSON arguments. Argument validation is the tool's
    /// responsibility; validation failures come back as `ToolResult::Error`.
    async fn execute(&self, args: Value) -> ToolResult;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Execute a tool by name. A missing tool is an observation, not a crash.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => ToolResult::Error(format!("tool '{}' not found", name)),
        }
    }

    /// Render "name: description\n  Parameters: ..." lines for the
    /// system prompt.
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
