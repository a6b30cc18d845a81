//! Python tool — run a snippet under the system interpreter

use crate::registry::{Tool, ToolParameter, ToolResult};
use crate::tools::bash::format_output;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

pub struct PythonTool {
    workspace_root: PathBuf,
    default_timeout_secs: u64,
}

impl PythonTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
            default_timeout_secs: 60,
        }
    }
}

#[async_trait::async_trait]
impl Tool for PythonTool {
    fn name(&self) -> &str {
        "run_python_code"
    }

    fn description(&self) -> &str {
        "Execute a Python code snippet and return stdout/stderr"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("code", "string", "Python source to execute"),
            ToolParameter::optional(
                "timeout",
                "integer",
                "Timeout in seconds (default 60, max 300)",
            ),
        ]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let code = match args["code"].as_str() {
            Some(c) if !c.trim().is_empty() => c,
            _ => return ToolResult::error("missing required parameter: code"),
        };

        let timeout_secs = args["timeout"]
            .as_u64()
            .unwrap_or(self.default_timeout_secs)
            .min(300);

        debug!("python: {} chars", code.len());

        let output = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            Command::new("python3")
                .arg("-c")
                .arg(code)
                .current_dir(&self.workspace_root)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("failed to execute python3: {}", e)),
            Err(_) => {
                return ToolResult::error(format!("execution timed out after {}s", timeout_secs))
            }
        };

        format_output(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn runs_print() {
        let tool = PythonTool::new(std::env::temp_dir());
        let result = tool.execute(json!({"code": "print(6 * 7)"})).await;
        assert_eq!(result.to_observation(), "42");
    }

    #[tokio::test]
    async fn syntax_error_surfaces_in_output() {
        let tool = PythonTool::new(std::env::temp_dir());
        let result = tool.execute(json!({"code": "def ("})).await;
        assert!(result.to_observation().contains("SyntaxError"));
    }

    #[tokio::test]
    async fn missing_code_is_error() {
        let tool = PythonTool::new(std::env::temp_dir());
        let result = tool.execute(json!({"timeout": 5})).await;
        assert!(result.is_error());
    }
}
