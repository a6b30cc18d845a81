//! Wire messages for the task fabric
//!
//! All messages are UTF-8 JSON on the broker. `correlation_id` is the token
//! a dispatcher uses to claim its reply on the shared result queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One unit of work, addressed to a profile's task queue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskMessage {
    pub task_id: String,
    pub correlation_id: String,
    /// Target queue key (profile name).
    pub profile: String,
    pub prompt: String,
    /// Subset of the target profile's tools.
    pub tools: Vec<String>,
    pub model_options: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl TaskMessage {
    pub fn new(
        profile: impl Into<String>,
        prompt: impl Into<String>,
        tools: Vec<String>,
        model_options: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            correlation_id: Uuid::new_v4().to_string(),
            profile: profile.into(),
            prompt: prompt.into(),
            tools,
            model_options,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a dispatched task.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
    Timeout,
}

/// Reply to a `TaskMessage`, matched by `correlation_id`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResultMessage {
    pub task_id: String,
    pub correlation_id: String,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<HashMap<String, u64>>,
    pub created_at: DateTime<Utc>,
}

impl ResultMessage {
    pub fn success(
        task_id: impl Into<String>,
        correlation_id: impl Into<String>,
        result: impl Into<String>,
        usage: Option<HashMap<String, u64>>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            correlation_id: correlation_id.into(),
            status: ResultStatus::Success,
            result: Some(result.into()),
            error: None,
            usage,
            created_at: Utc::now(),
        }
    }

    pub fn error(
        task_id: impl Into<String>,
        correlation_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            correlation_id: correlation_id.into(),
            status: ResultStatus::Error,
            result: None,
            error: Some(error.into()),
            usage: None,
            created_at: Utc::now(),
        }
    }

    /// Synthesised by the dispatcher when no reply arrives before the
    /// deadline. Timeouts are never silent.
    pub fn timeout(
        task_id: impl Into<String>,
        correlation_id: impl Into<String>,
        seconds: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            correlation_id: correlation_id.into(),
            status: ResultStatus::Timeout,
            result: None,
            error: Some(format!("no result received within {seconds} seconds")),
            usage: None,
            created_at: Utc::now(),
        }
    }
}
