//! Worker profile model (YAML, one document per file)

use raid_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Container options for a worker type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContainerOptions {
    pub base_image: String,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_packages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<String>>,
    #[serde(default)]
    pub persistent_storage: bool,
}

fn default_working_dir() -> String {
    "/app".to_string()
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            base_image: "python:3.11-slim".to_string(),
            working_dir: default_working_dir(),
            expose_port: None,
            additional_packages: None,
            environment_variables: None,
            volumes: None,
            persistent_storage: false,
        }
    }
}

/// Lifecycle policy flags copied onto worker records at registration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Never auto-reaped by any pass.
    #[serde(default)]
    pub persistent: bool,
    #[serde(default = "default_true")]
    pub auto_cleanup: bool,
    /// Not charged against the capacity limit.
    #[serde(default)]
    pub exclude_from_count: bool,
}

fn default_true() -> bool {
    true
}

/// Static description of a worker type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Model-backend options merged over the process configuration
    /// (keys: provider, model, max_tokens, temperature).
    pub llm_config: serde_json::Map<String, serde_json::Value>,
    /// Ordered tool names; each must resolve in the tool registry.
    pub tools: Vec<String>,
    pub system_prompt: String,
    pub docker_config: ContainerOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_config: Option<LifecyclePolicy>,
}

impl Profile {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::Parse(format!("profile yaml: {e}")))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Internal(format!("profile yaml: {e}")))
    }

    /// Lifecycle flags with defaults applied.
    pub fn lifecycle(&self) -> LifecyclePolicy {
        self.lifecycle_config.unwrap_or(LifecyclePolicy {
            persistent: false,
            auto_cleanup: true,
            exclude_from_count: false,
        })
    }

    /// Structural validation. `known_tools` is the resolvable tool set;
    /// pass an empty slice to skip tool checking (dynamic contexts).
    pub fn validate(&self, known_tools: &[&str]) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_profile("<unnamed>", "name is required"));
        }
        if self.version.trim().is_empty() {
            return Err(Error::invalid_profile(&self.name, "version is required"));
        }
        if self.docker_config.base_image.trim().is_empty() {
            return Err(Error::invalid_profile(&self.name, "base_image is required"));
        }
        if !known_tools.is_empty() {
            for tool in &self.tools {
                if !known_tools.contains(&tool.as_str()) {
                    return Err(Error::invalid_profile(
                        &self.name,
                        format!("references unknown tool '{tool}'"),
                    ));
                }
            }
        }
        Ok(())
    }
}
