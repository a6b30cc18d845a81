//! Error types for Raid

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("invalid profile: {name} - {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("container runtime error: {0}")]
    ContainerRuntime(String),

    #[error("model invocation failed: {provider} - {message}")]
    ModelInvocation { provider: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("tool error: {name} - {message}")]
    Tool { name: String, message: String },

    #[error("capacity exceeded: {current} of {limit} workers in use")]
    CapacityExceeded { current: usize, limit: usize },

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("message rejected: {0}")]
    ValidationRejected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid(reason.into())
    }

    pub fn invalid_profile(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn model(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelInvocation {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            message: message.into(),
        }
    }
}
