//! In-memory broker
//!
//! Same contract as the Redis broker, held entirely in process memory.
//! Used by tests and by single-process deployments without a broker.

use crate::broker::{Broker, BrokerError, Subscription};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    pushed: Notify,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, queue: &str) -> Option<String> {
        self.queues
            .lock()
            .expect("queue lock")
            .get_mut(queue)
            .and_then(|q| q.pop_front())
    }

    fn channel_sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .expect("channel lock")
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }

    /// Number of queued payloads; test observability.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .expect("queue lock")
            .get(queue)
            .map(|q| q.len())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Broker for InMemoryBroker {
    async fn ping(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn push(&self, queue: &str, payload: &str) -> Result<(), BrokerError> {
        self.queues
            .lock()
            .expect("queue lock")
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(payload) = self.try_pop(queue) {
                return Ok(Some(payload));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            // Wake on push or re-check periodically; a push can land between
            // the check above and the wait below.
            tokio::select! {
                _ = self.pushed.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
        }
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        // No subscribers is fine; pub/sub is fire-and-forget
        let _ = self.channel_sender(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let mut source = self.channel_sender(channel).subscribe();
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let pump_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    received = source.recv() => match received {
                        Ok(payload) => {
                            if tx.send(payload).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(Subscription::new(rx, cancel))
    }
}
