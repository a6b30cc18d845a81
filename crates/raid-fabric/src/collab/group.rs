//! Collaboration group: membership, validation, rate limiting, history

use crate::broker::{collab_channel, Broker};
use crate::collab::message::{CollabMessage, CollabMessageType};
use chrono::{DateTime, Duration, Utc};
use raid_core::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const HISTORY_CAPACITY: usize = 256;

/// Restrictions applied to every message through a group.
#[derive(Clone, Debug)]
pub struct GroupRestrictions {
    pub allowed_message_types: HashSet<CollabMessageType>,
    pub max_message_size_bytes: usize,
    pub max_messages_per_minute: usize,
    /// When set, `data` payload keys must be a subset.
    pub allowed_data_keys: Option<HashSet<String>>,
    pub collaboration_timeout_minutes: i64,
}

impl Default for GroupRestrictions {
    fn default() -> Self {
        Self {
            allowed_message_types: HashSet::from([
                CollabMessageType::DataShare,
                CollabMessageType::RequestData,
                CollabMessageType::StatusUpdate,
            ]),
            max_message_size_bytes: 10_000,
            max_messages_per_minute: 30,
            allowed_data_keys: None,
            collaboration_timeout_minutes: 60,
        }
    }
}

impl GroupRestrictions {
    /// Preset restrictions for a collaboration mode.
    pub fn for_mode(mode: &str, allowed_data_keys: Option<HashSet<String>>) -> Self {
        use CollabMessageType::*;
        let (types, per_minute, timeout): (&[CollabMessageType], usize, i64) = match mode {
            "data_sharing" => (&[DataShare, RequestData, StatusUpdate], 20, 45),
            "validation_chain" => (&[DataShare, Validation, StatusUpdate, ErrorReport], 15, 30),
            "parallel_analysis" => (&[DataShare, StatusUpdate, Coordination], 25, 60),
            "sequential_workflow" => (&[DataShare, StatusUpdate, Coordination, RequestData], 10, 90),
            _ => (&[DataShare, StatusUpdate], 15, 60),
        };
        Self {
            allowed_message_types: types.iter().copied().collect(),
            max_messages_per_minute: per_minute,
            collaboration_timeout_minutes: timeout,
            allowed_data_keys,
            ..Default::default()
        }
    }
}

struct MemberInfo {
    role: String,
    joined_at: DateTime<Utc>,
    permissions: HashSet<CollabMessageType>,
    message_count: u64,
    last_activity: DateTime<Utc>,
}

#[derive(Default)]
struct GroupState {
    members: HashMap<String, MemberInfo>,
    history: VecDeque<CollabMessage>,
    /// Sliding-window send timestamps per member (last 60 s).
    rate_window: HashMap<String, Vec<DateTime<Utc>>>,
    rejected_count: u64,
}

/// Snapshot of a group's current state.
#[derive(Clone, Debug)]
pub struct GroupStatus {
    pub group_id: String,
    pub group_name: String,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub total_messages: usize,
    pub rejected_messages: u64,
    pub active_members: Vec<String>,
}

/// A named set of workers sharing a validated, rate-limited pub/sub channel.
pub struct CollabGroup {
    pub group_id: String,
    pub group_name: String,
    pub created_at: DateTime<Utc>,
    restrictions: GroupRestrictions,
    broker: Arc<dyn Broker>,
    state: Mutex<GroupState>,
}

impl CollabGroup {
    pub fn new(
        group_id: impl Into<String>,
        group_name: impl Into<String>,
        restrictions: GroupRestrictions,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            group_name: group_name.into(),
            created_at: Utc::now(),
            restrictions,
            broker,
            state: Mutex::new(GroupState::default()),
        }
    }

    pub fn restrictions(&self) -> &GroupRestrictions {
        &self.restrictions
    }

    pub fn channel(&self) -> String {
        collab_channel(&self.group_id)
    }

    pub async fn add_member(
        &self,
        name: &str,
        role: &str,
        permissions: Option<HashSet<CollabMessageType>>,
    ) {
        let mut state = self.state.lock().await;
        state.members.insert(
            name.to_string(),
            MemberInfo {
                role: role.to_string(),
                joined_at: Utc::now(),
                permissions: permissions
                    .unwrap_or_else(|| self.restrictions.allowed_message_types.clone()),
                message_count: 0,
                last_activity: Utc::now(),
            },
        );
    }

    pub async fn remove_member(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.members.remove(name);
        state.rate_window.remove(name);
    }

    pub async fn members(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut names: Vec<String> = state.members.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn member_role(&self, name: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.members.get(name).map(|m| m.role.clone())
    }

    /// Validate and publish a message.
    ///
    /// Rejected messages are dropped and counted; they are never reshaped.
    pub async fn send(&self, message: &CollabMessage) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Err(reason) = Self::validate(&self.restrictions, &state, message) {
            state.rejected_count += 1;
            warn!(
                "rejected {} message from '{}' in group {}: {}",
                message_type_name(message.message_type),
                message.sender,
                self.group_id,
                reason
            );
            return Err(Error::ValidationRejected(reason));
        }

        let now = Utc::now();
        state
            .rate_window
            .entry(message.sender.clone())
            .or_default()
            .push(now);

        if let Some(member) = state.members.get_mut(&message.sender) {
            member.message_count += 1;
            member.last_activity = now;
        }

        state.history.push_back(message.clone());
        while state.history.len() > HISTORY_CAPACITY {
            state.history.pop_front();
        }
        drop(state);

        let payload = serde_json::to_string(message)?;
        self.broker
            .publish(&self.channel(), &payload)
            .await
            .map_err(|e| Error::BrokerUnavailable(e.to_string()))?;

        debug!(
            "published {} from '{}' to {}",
            message_type_name(message.message_type),
            message.sender,
            self.channel()
        );
        Ok(())
    }

    fn validate(
        restrictions: &GroupRestrictions,
        state: &GroupState,
        message: &CollabMessage,
    ) -> std::result::Result<(), String> {
        let Some(member) = state.members.get(&message.sender) else {
            return Err(format!("sender '{}' is not a group member", message.sender));
        };

        if !member.permissions.contains(&message.message_type) {
            return Err(format!(
                "message type '{}' not permitted for sender",
                message_type_name(message.message_type)
            ));
        }

        if let Some(target) = &message.target {
            if !state.members.contains_key(target) {
                return Err(format!("target '{}' is not a group member", target));
            }
        }

        if message.payload_field_count() > 1 {
            return Err("message carries more than one payload field".to_string());
        }

        let serialized = serde_json::to_string(message).map_err(|e| e.to_string())?;
        if serialized.len() > restrictions.max_message_size_bytes {
            return Err(format!(
                "payload of {} bytes exceeds limit of {}",
                serialized.len(),
                restrictions.max_message_size_bytes
            ));
        }

        // Sliding count over the trailing 60 s, not a token bucket
        let cutoff = Utc::now() - Duration::seconds(60);
        let recent = state
            .rate_window
            .get(&message.sender)
            .map(|times| times.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0);
        if recent >= restrictions.max_messages_per_minute {
            return Err(format!(
                "rate limit of {} messages per minute reached",
                restrictions.max_messages_per_minute
            ));
        }

        if let (Some(data), Some(allowed)) = (&message.data, &restrictions.allowed_data_keys) {
            for key in data.keys() {
                if !allowed.contains(key) {
                    return Err(format!("data key '{}' is not in the allow-list", key));
                }
            }
        }

        Ok(())
    }

    /// Drop expired messages from history; returns how many were removed.
    pub async fn cleanup_expired_messages(&self) -> usize {
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.retain(|m| !m.is_expired());

        // Prune stale rate-window entries while we hold the lock
        let cutoff = Utc::now() - Duration::seconds(60);
        for times in state.rate_window.values_mut() {
            times.retain(|t| *t > cutoff);
        }

        before - state.history.len()
    }

    /// True when every member has been inactive for at least `idle`.
    pub async fn is_inactive(&self, idle: Duration) -> bool {
        let state = self.state.lock().await;
        let cutoff = Utc::now() - idle;
        state.members.values().all(|m| m.last_activity < cutoff)
    }

    pub async fn status(&self) -> GroupStatus {
        let state = self.state.lock().await;
        let active_cutoff = Utc::now() - Duration::minutes(5);
        let mut members: Vec<String> = state.members.keys().cloned().collect();
        members.sort();
        GroupStatus {
            group_id: self.group_id.clone(),
            group_name: self.group_name.clone(),
            members,
            created_at: self.created_at,
            total_messages: state.history.len(),
            rejected_messages: state.rejected_count,
            active_members: state
                .members
                .iter()
                .filter(|(_, m)| m.last_activity > active_cutoff)
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }

    #[doc(hidden)]
    pub async fn member_joined_at(&self, name: &str) -> Option<DateTime<Utc>> {
        let state = self.state.lock().await;
        state.members.get(name).map(|m| m.joined_at)
    }
}

fn message_type_name(t: CollabMessageType) -> &'static str {
    match t {
        CollabMessageType::DataShare => "data_share",
        CollabMessageType::RequestData => "request_data",
        CollabMessageType::StatusUpdate => "status_update",
        CollabMessageType::Coordination => "coordination",
        CollabMessageType::Validation => "validation",
        CollabMessageType::ErrorReport => "error_report",
    }
}
