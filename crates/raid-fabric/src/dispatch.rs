//! Task dispatcher: correlation-matched request/reply over shared queues
//!
//! Several dispatchers may poll the same result queue concurrently. Each one
//! consumes only the reply carrying its own correlation id; anything else is
//! pushed back for its rightful owner.

use crate::broker::{result_queue, task_queue, Broker};
use raid_core::{ResultMessage, TaskMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Unit timeout for each blocking pop while waiting.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How many times one foreign result is re-enqueued before being dropped.
/// Bounds the requeue loop when a peer dispatcher has already given up.
const MAX_REQUEUES_PER_RESULT: u32 = 3;

pub struct Dispatcher {
    broker: Arc<dyn Broker>,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Send a task and wait for its result.
    ///
    /// Returns a `ResultMessage` in every case: the worker's reply, a
    /// synthetic `timeout` at the deadline, or a synthetic `error` when the
    /// broker fails mid-wait.
    pub async fn dispatch(&self, task: &TaskMessage, timeout: Duration) -> ResultMessage {
        let queue = task_queue(&task.profile);
        let payload = match serde_json::to_string(task) {
            Ok(p) => p,
            Err(e) => {
                return ResultMessage::error(
                    &task.task_id,
                    &task.correlation_id,
                    format!("failed to serialize task: {e}"),
                )
            }
        };

        if let Err(e) = self.broker.push(&queue, &payload).await {
            return ResultMessage::error(
                &task.task_id,
                &task.correlation_id,
                format!("broker unavailable: {e}"),
            );
        }
        debug!(
            "dispatched task {} to {} (correlation {})",
            task.task_id, queue, task.correlation_id
        );

        self.wait_for_result(&task.profile, task, timeout).await
    }

    async fn wait_for_result(
        &self,
        profile: &str,
        task: &TaskMessage,
        timeout: Duration,
    ) -> ResultMessage {
        let queue = result_queue(profile);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut requeue_counts: HashMap<String, u32> = HashMap::new();

        loop {
            if tokio::time::Instant::now() >= deadline {
                debug!(
                    "dispatch {} timed out after {}s",
                    task.correlation_id,
                    timeout.as_secs()
                );
                return ResultMessage::timeout(
                    &task.task_id,
                    &task.correlation_id,
                    timeout.as_secs(),
                );
            }

            let popped = match self.broker.pop(&queue, POLL_INTERVAL).await {
                Ok(p) => p,
                Err(e) => {
                    return ResultMessage::error(
                        &task.task_id,
                        &task.correlation_id,
                        format!("broker unavailable while waiting: {e}"),
                    )
                }
            };

            let Some(payload) = popped else { continue };

            let result: ResultMessage = match serde_json::from_str(&payload) {
                Ok(r) => r,
                Err(e) => {
                    warn!("dropping malformed result payload on {}: {}", queue, e);
                    continue;
                }
            };

            if result.correlation_id == task.correlation_id {
                return result;
            }

            // Someone else's reply. Re-enqueue it, but only a bounded number
            // of times: if its owner is gone it must not circulate forever.
            let count = requeue_counts
                .entry(result.correlation_id.clone())
                .or_insert(0);
            *count += 1;
            if *count > MAX_REQUEUES_PER_RESULT {
                warn!(
                    "dropping unclaimed result {} after {} requeues",
                    result.correlation_id, MAX_REQUEUES_PER_RESULT
                );
                continue;
            }

            if let Err(e) = self.broker.push(&queue, &payload).await {
                warn!("failed to requeue foreign result: {}", e);
            }
        }
    }
}

/// Worker-side helpers: receive tasks, send results.
impl Dispatcher {
    /// Blocking-pop the next task for a profile.
    pub async fn next_task(
        &self,
        profile: &str,
        timeout: Duration,
    ) -> Result<Option<TaskMessage>, raid_core::Error> {
        let queue = task_queue(profile);
        let popped = self
            .broker
            .pop(&queue, timeout)
            .await
            .map_err(|e| raid_core::Error::BrokerUnavailable(e.to_string()))?;

        match popped {
            Some(payload) => {
                let task = serde_json::from_str(&payload)
                    .map_err(|e| raid_core::Error::Parse(format!("task payload: {e}")))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Push a result onto a profile's result queue.
    pub async fn send_result(
        &self,
        profile: &str,
        result: &ResultMessage,
    ) -> Result<(), raid_core::Error> {
        let payload = serde_json::to_string(result)?;
        self.broker
            .push(&result_queue(profile), &payload)
            .await
            .map_err(|e| raid_core::Error::BrokerUnavailable(e.to_string()))
    }
}
