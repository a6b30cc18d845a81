//! Raid Tools — the worker-side toolset
//!
//! Each tool is a self-contained file in src/tools/.
//! To add a tool: create the file, implement Tool, register it below.

pub mod registry;
pub mod tools;

pub use registry::{Tool, ToolParameter, ToolRegistry, ToolResult};

use std::path::Path;

/// Names of every builtin tool. Profiles are validated against this list.
pub const BUILTIN_TOOL_NAMES: &[&str] = &[
    "calculator",
    "run_bash_command",
    "run_python_code",
    "create_file",
    "read_file",
    "list_files",
    "delete_file",
];

/// Create a registry containing only the named tools.
///
/// Workers call this with their profile's tool list; a tool the profile does
/// not declare is never registered, so the model never sees it.
pub fn create_registry_for(names: &[String], workspace_root: impl AsRef<Path>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let root = workspace_root.as_ref();

    for name in names {
        match name.as_str() {
            "calculator" => registry.register(tools::calculator::CalculatorTool::new()),
            "run_bash_command" => registry.register(tools::bash::BashTool::new(root)),
            "run_python_code" => registry.register(tools::python::PythonTool::new(root)),
            "create_file" => registry.register(tools::files::CreateFileTool::new(root)),
            "read_file" => registry.register(tools::files::ReadFileTool::new(root)),
            "list_files" => registry.register(tools::files::ListFilesTool::new(root)),
            "delete_file" => registry.register(tools::files::DeleteFileTool::new(root)),
            other => tracing::warn!("unknown tool in profile: {}", other),
        }
    }

    registry
}
