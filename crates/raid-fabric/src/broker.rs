//! Broker capability: list queues plus pub/sub
//!
//! The broker is an external collaborator; everything above it speaks this
//! trait so tests run against the in-memory implementation.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Broker error types
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("broker operation failed: {0}")]
    Operation(String),
}

impl From<redis::RedisError> for BrokerError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            BrokerError::Connection(e.to_string())
        } else {
            BrokerError::Operation(e.to_string())
        }
    }
}

/// Task queue key for a profile (LPUSH producers, BRPOP consumers).
pub fn task_queue(profile: &str) -> String {
    format!("tasks:{profile}")
}

/// Result queue key for a profile.
pub fn result_queue(profile: &str) -> String {
    format!("results:{profile}")
}

/// Pub/sub channel for a collaboration group.
pub fn collab_channel(group_id: &str) -> String {
    format!("collab:{group_id}")
}

/// A live pub/sub subscription. Dropping it (or cancelling) stops the
/// background pump.
pub struct Subscription {
    rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<String>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next raw payload; `None` when the subscription has closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Pub/sub + list-based queues with blocking pop.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Reachability probe; used for the start-up check.
    async fn ping(&self) -> Result<(), BrokerError>;

    /// Push a payload onto a queue (FIFO arrival order).
    async fn push(&self, queue: &str, payload: &str) -> Result<(), BrokerError>;

    /// Blocking pop with a timeout; `Ok(None)` on timeout.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError>;

    /// Publish to a pub/sub channel (fire-and-forget fan-out).
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError>;

    /// Subscribe to a channel; messages published after this call are
    /// delivered in per-sender order.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;
}
