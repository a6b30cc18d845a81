//! Request/response types for model backends

use serde::{Deserialize, Serialize};

/// A message in a model conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmMessage {
    /// "system", "user", or "assistant"
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call overrides; `None` falls back to the backend's configuration.
#[derive(Clone, Debug, Default)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Token usage as reported by the backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Completed (non-streaming) response from a backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: Option<Usage>,
    pub model: String,
}
