//! File operation tools — create, read, list, delete within the workspace
//!
//! Every path resolves against the workspace root; traversal outside it is
//! rejected before any filesystem call.

use crate::registry::{Tool, ToolParameter, ToolResult};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

const MAX_READ_CHARS: usize = 50_000;

/// Resolve `relative` against `root`, rejecting absolute paths and `..`.
fn resolve(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err(format!("absolute paths are not allowed: {}", relative));
    }
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            return Err(format!("path escapes the workspace: {}", relative));
        }
    }
    Ok(root.join(candidate))
}

fn path_arg(args: &Value) -> Result<&str, String> {
    match args["path"].as_str() {
        Some(p) if !p.trim().is_empty() => Ok(p),
        _ => Err("missing required parameter: path".to_string()),
    }
}

// ---------------------------------------------------------------------------
// create_file
// ---------------------------------------------------------------------------

pub struct CreateFileTool {
    root: PathBuf,
}

impl CreateFileTool {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the workspace with the given content"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("path", "string", "Path relative to the workspace"),
            ToolParameter::required("content", "string", "File content to write"),
        ]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = match path_arg(&args) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let content = args["content"].as_str().unwrap_or_default();

        let full = match resolve(&self.root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        if let Some(parent) = full.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!("failed to create directories: {}", e));
            }
        }

        match tokio::fs::write(&full, content).await {
            Ok(()) => ToolResult::text(format!("Created file '{}' ({} bytes)", path, content.len())),
            Err(e) => ToolResult::error(format!("failed to write '{}': {}", path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace and return its content"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "path",
            "string",
            "Path relative to the workspace",
        )]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = match path_arg(&args) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let full = match resolve(&self.root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        match tokio::fs::read_to_string(&full).await {
            Ok(content) if content.len() > MAX_READ_CHARS => {
                let boundary = content
                    .char_indices()
                    .take_while(|(i, _)| *i <= MAX_READ_CHARS)
                    .last()
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                ToolResult::text(format!(
                    "{}\n... [truncated, {} total chars]",
                    &content[..boundary],
                    content.len()
                ))
            }
            Ok(content) => ToolResult::text(content),
            Err(e) => ToolResult::error(format!("failed to read '{}': {}", path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// list_files
// ---------------------------------------------------------------------------

pub struct ListFilesTool {
    root: PathBuf,
}

impl ListFilesTool {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories at a workspace path"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::optional(
            "path",
            "string",
            "Directory relative to the workspace (default: workspace root)",
        )]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = args["path"].as_str().unwrap_or(".");
        let full = match resolve(&self.root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        let mut entries = match tokio::fs::read_dir(&full).await {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(format!("failed to list '{}': {}", path, e)),
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let suffix = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => "/",
                _ => "",
            };
            names.push(format!("{}{}", entry.file_name().to_string_lossy(), suffix));
        }
        names.sort();

        if names.is_empty() {
            ToolResult::text("(empty directory)")
        } else {
            ToolResult::text(names.join("\n"))
        }
    }
}

// ---------------------------------------------------------------------------
// delete_file
// ---------------------------------------------------------------------------

pub struct DeleteFileTool {
    root: PathBuf,
}

impl DeleteFileTool {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from the workspace"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "path",
            "string",
            "Path relative to the workspace",
        )]
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = match path_arg(&args) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let full = match resolve(&self.root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        match tokio::fs::remove_file(&full).await {
            Ok(()) => ToolResult::text(format!("Deleted file '{}'", path)),
            Err(e) => ToolResult::error(format!("failed to delete '{}': {}", path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_read_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        let create = CreateFileTool::new(dir.path());
        let result = create
            .execute(json!({"path": "notes/a.txt", "content": "hello"}))
            .await;
        assert!(!result.is_error(), "{}", result.to_observation());

        let read = ReadFileTool::new(dir.path());
        let result = read.execute(json!({"path": "notes/a.txt"})).await;
        assert_eq!(result.to_observation(), "hello");

        let delete = DeleteFileTool::new(dir.path());
        let result = delete.execute(json!({"path": "notes/a.txt"})).await;
        assert!(!result.is_error());

        let result = read.execute(json!({"path": "notes/a.txt"})).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn list_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("f.txt"), "x").unwrap();

        let list = ListFilesTool::new(dir.path());
        let result = list.execute(json!({})).await;
        let listing = result.to_observation();
        assert!(listing.contains("sub/"));
        assert!(listing.contains("f.txt"));
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let read = ReadFileTool::new(dir.path());

        let result = read.execute(json!({"path": "../etc/passwd"})).await;
        assert!(result.is_error());
        assert!(result.to_observation().contains("escapes"));

        let result = read.execute(json!({"path": "/etc/passwd"})).await;
        assert!(result.is_error());
    }
}
