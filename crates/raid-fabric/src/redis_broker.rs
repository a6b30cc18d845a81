//! Redis-backed broker

use crate::broker::{Broker, BrokerError, Subscription};
use futures::StreamExt;
use raid_core::BrokerConfig;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct RedisBroker {
    client: redis::Client,
    /// Shared connection for non-blocking commands (cheaply cloneable).
    conn: redis::aio::MultiplexedConnection,
}

impl RedisBroker {
    /// Connect and verify reachability.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client = redis::Client::open(config.url())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        debug!("connected to broker at {}:{}", config.host, config.port);
        Ok(Self { client, conn })
    }
}

#[async_trait::async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }

    async fn push(&self, queue: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        // BRPOP needs a dedicated connection: it would stall every other
        // command multiplexed onto the shared one.
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let secs = timeout.as_secs().max(1);
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(secs)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|(_, payload)| payload))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(BrokerError::from)?;

        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let pump_cancel = cancel.clone();
        let channel_name = channel.to_string();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    msg = stream.next() => {
                        let Some(msg) = msg else { break };
                        match msg.get_payload::<String>() {
                            Ok(payload) => {
                                if tx.send(payload).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("non-utf8 payload on {}: {}", channel_name, e);
                            }
                        }
                    }
                }
            }
            debug!("subscription to {} closed", channel_name);
        });

        Ok(Subscription::new(rx, cancel))
    }
}
