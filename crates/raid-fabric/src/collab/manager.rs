//! Global manager for collaboration groups

use crate::broker::Broker;
use crate::collab::group::{CollabGroup, GroupRestrictions, GroupStatus};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub struct CollabManager {
    broker: Arc<dyn Broker>,
    groups: Mutex<HashMap<String, Arc<CollabGroup>>>,
    counter: AtomicU64,
}

impl CollabManager {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            groups: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Create a group with a fresh unique id.
    pub async fn create_group(
        &self,
        group_name: &str,
        restrictions: GroupRestrictions,
    ) -> Arc<CollabGroup> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_string();
        let group_id = format!("collab_{}_{}", n, suffix);

        let group = Arc::new(CollabGroup::new(
            &group_id,
            group_name,
            restrictions,
            self.broker.clone(),
        ));

        self.groups
            .lock()
            .await
            .insert(group_id.clone(), group.clone());
        info!("created collaboration group {} ('{}')", group_id, group_name);
        group
    }

    pub async fn get(&self, group_id: &str) -> Option<Arc<CollabGroup>> {
        self.groups.lock().await.get(group_id).cloned()
    }

    pub async fn list(&self) -> Vec<GroupStatus> {
        let groups: Vec<Arc<CollabGroup>> = self.groups.lock().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(groups.len());
        for group in groups {
            statuses.push(group.status().await);
        }
        statuses
    }

    /// Remove groups older than `max_age_hours` whose members have all been
    /// inactive for an hour. Returns the removed group ids.
    pub async fn cleanup_inactive(&self, max_age_hours: i64) -> Vec<String> {
        let age_cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut removed = Vec::new();

        let candidates: Vec<Arc<CollabGroup>> =
            self.groups.lock().await.values().cloned().collect();

        for group in candidates {
            if group.created_at < age_cutoff && group.is_inactive(Duration::hours(1)).await {
                removed.push(group.group_id.clone());
            }
        }

        let mut groups = self.groups.lock().await;
        for group_id in &removed {
            groups.remove(group_id);
            info!("cleaned up inactive collaboration group {}", group_id);
        }
        removed
    }

    /// Drop every group. Subscriptions held by workers close when their
    /// `Subscription` handles drop.
    pub async fn shutdown_all(&self) {
        let mut groups = self.groups.lock().await;
        let count = groups.len();
        groups.clear();
        if count > 0 {
            info!("shut down {} collaboration group(s)", count);
        }
    }
}
