//! Collaboration message format
//!
//! Incoming payloads are parsed with strict serde; a payload that does not
//! deserialize is dropped by the listener, never evaluated.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollabMessageType {
    /// Share computed data/results
    DataShare,
    /// Request specific data from another worker
    RequestData,
    /// Update on task progress
    StatusUpdate,
    /// Coordinate next steps
    Coordination,
    /// Request validation of results
    Validation,
    /// Report errors or issues
    ErrorReport,
}

/// Message exchanged between workers in a collaboration group.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CollabMessage {
    pub message_id: String,
    pub group_id: String,
    pub sender: String,
    /// Absent means broadcast to the whole group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(rename = "type")]
    pub message_type: CollabMessageType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    // Restricted payload: at most one of these is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollabMessage {
    fn base(message_type: CollabMessageType, sender: &str, group_id: &str) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            group_id: group_id.to_string(),
            sender: sender.to_string(),
            target: None,
            message_type,
            created_at: Utc::now(),
            expires_at: None,
            correlation_id: None,
            data: None,
            request: None,
            status: None,
            error: None,
        }
    }

    /// Data share; expires after 30 minutes.
    pub fn data_share(
        sender: &str,
        group_id: &str,
        data: HashMap<String, serde_json::Value>,
        target: Option<&str>,
    ) -> Self {
        let mut msg = Self::base(CollabMessageType::DataShare, sender, group_id);
        msg.target = target.map(String::from);
        msg.data = Some(data);
        msg.expires_at = Some(Utc::now() + Duration::minutes(30));
        msg
    }

    /// Data request to a specific worker; expires after 10 minutes.
    pub fn request_data(sender: &str, group_id: &str, target: &str, request: &str) -> Self {
        let mut msg = Self::base(CollabMessageType::RequestData, sender, group_id);
        msg.target = Some(target.to_string());
        msg.request = Some(request.to_string());
        msg.expires_at = Some(Utc::now() + Duration::minutes(10));
        msg
    }

    /// Broadcast status update; expires after 15 minutes.
    pub fn status_update(sender: &str, group_id: &str, status: &str) -> Self {
        let mut msg = Self::base(CollabMessageType::StatusUpdate, sender, group_id);
        msg.status = Some(status.to_string());
        msg.expires_at = Some(Utc::now() + Duration::minutes(15));
        msg
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Utc::now() > t).unwrap_or(false)
    }

    /// Count of payload fields set; valid messages carry at most one.
    pub fn payload_field_count(&self) -> usize {
        [
            self.data.is_some(),
            self.request.is_some(),
            self.status.is_some(),
            self.error.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Subscriber-side filter: should `member` handle this message?
///
/// Skips self-authored messages, messages targeted at another member, and
/// expired messages.
pub fn should_deliver(message: &CollabMessage, member: &str) -> bool {
    if message.sender == member {
        return false;
    }
    if let Some(target) = &message.target {
        if target != member {
            return false;
        }
    }
    !message.is_expired()
}
