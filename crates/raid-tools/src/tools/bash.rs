//! Bash tool — execute shell commands with a timeout

use crate::registry::{Tool, ToolParameter, ToolResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

const MAX_OUTPUT_CHARS: usize = 10_000;

pub struct BashTool {
    workspace_root: PathBuf,
    default_timeout_secs: u64,
}

impl BashTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
            default_timeout_secs: 60,
        }
    }
}

#[async_trait::async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "run_bash_command"
    }

    fn description(&self) -> &str {
        "Execute a bash command in the workspace directory and return its output"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("command", "string", "The bash command to execute"),
            ToolParameter::optional(
                "timeout",
                "integer",
                "Timeout in seconds (default 60, max 300)",
            ),
        ]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let command = match args["command"].as_str() {
            Some(c) if !c.trim().is_empty() => c,
            _ => return ToolResult::error("missing required parameter: command"),
        };

        let timeout_secs = args["timeout"]
            .as_u64()
            .unwrap_or(self.default_timeout_secs)
            .min(300);

        debug!("bash: {}", &command[..command.len().min(80)]);

        let output = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            Command::new("bash")
                .arg("-c")
                .arg(command)
                .current_dir(&self.workspace_root)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("failed to execute: {}", e)),
            Err(_) => {
                return ToolResult::error(format!("command timed out after {}s", timeout_secs))
            }
        };

        format_output(&output)
    }
}

pub(crate) fn format_output(output: &std::process::Output) -> ToolResult {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let combined = if output.status.success() {
        if stderr.is_empty() {
            stdout.trim().to_string()
        } else {
            format!("{}\n{}", stdout.trim(), stderr.trim())
        }
    } else {
        format!(
            "Exit code: {}\n{}\n{}",
            output.status.code().unwrap_or(-1),
            stdout.trim(),
            stderr.trim()
        )
    };

    if combined.is_empty() {
        ToolResult::text("(no output)")
    } else {
        ToolResult::text(truncate(&combined))
    }
}

pub(crate) fn truncate(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let boundary = text
        .char_indices()
        .take_while(|(i, _)| *i <= MAX_OUTPUT_CHARS)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!(
        "{}\n... [truncated, {} total chars]",
        &text[..boundary],
        text.len()
    )
}
