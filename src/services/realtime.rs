//! Real-time delivery of order and notification events.
//!
//! Handlers publish through the [`EventBus`] held in `AppState`; WebSocket
//! sessions subscribe to the channels of the connected user. Delivery is
//! best-effort: a publish never fails the request that triggered it.

use futures_util::{future::BoxFuture, stream::BoxStream, StreamExt};
use redis::AsyncCommands;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    User(Uuid),
    Pharmacy(Uuid),
    Admins,
}

impl Channel {
    pub fn name(&self) -> String {
        match self {
            Channel::User(id) => format!("user:{id}"),
            Channel::Pharmacy(id) => format!("pharmacie:{id}"),
            Channel::Admins => "admins".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeEvent {
    pub event: &'static str,
    pub data: serde_json::Value,
}

impl RealtimeEvent {
    pub fn new(event: &'static str, data: impl Serialize) -> Self {
        Self {
            event,
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Wire form sent to WebSocket clients.
    pub fn encode(&self, channel: &Channel) -> String {
        serde_json::json!({
            "channel": channel.name(),
            "event": self.event,
            "data": self.data,
        })
        .to_string()
    }
}

pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish.
    fn publish(&self, channel: &Channel, event: RealtimeEvent);

    /// Stream of encoded events published on any of `channels`.
    fn subscribe(
        &self,
        channels: Vec<Channel>,
    ) -> BoxFuture<'static, anyhow::Result<BoxStream<'static, String>>>;
}

/// Redis pub/sub backed bus, shared by every API instance.
pub struct RedisEventBus {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
}

impl RedisEventBus {
    pub fn new(client: redis::Client, conn: redis::aio::MultiplexedConnection) -> Self {
        Self { client, conn }
    }
}

impl EventBus for RedisEventBus {
    fn publish(&self, channel: &Channel, event: RealtimeEvent) {
        let mut conn = self.conn.clone();
        let name = channel.name();
        let payload = event.encode(channel);
        tokio::spawn(async move {
            if let Err(e) = conn.publish::<_, _, ()>(&name, &payload).await {
                tracing::warn!("Redis publish on {name} failed: {e}");
            }
        });
    }

    fn subscribe(
        &self,
        channels: Vec<Channel>,
    ) -> BoxFuture<'static, anyhow::Result<BoxStream<'static, String>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut pubsub = client.get_async_pubsub().await?;
            for channel in &channels {
                pubsub.subscribe(channel.name()).await?;
            }
            let stream = pubsub
                .into_on_message()
                .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
            Ok(stream.boxed())
        })
    }
}

/// In-process bus for single-node deployments and tests.
pub struct LocalEventBus {
    tx: broadcast::Sender<(String, String)>,
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Raw receiver of `(channel name, encoded event)` pairs.
    pub fn receiver(&self) -> broadcast::Receiver<(String, String)> {
        self.tx.subscribe()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for LocalEventBus {
    fn publish(&self, channel: &Channel, event: RealtimeEvent) {
        // No receivers is not an error: nobody is connected.
        let _ = self.tx.send((channel.name(), event.encode(channel)));
    }

    fn subscribe(
        &self,
        channels: Vec<Channel>,
    ) -> BoxFuture<'static, anyhow::Result<BoxStream<'static, String>>> {
        let rx = self.tx.subscribe();
        let names: Vec<String> = channels.iter().map(Channel::name).collect();
        Box::pin(async move {
            let stream = futures_util::stream::unfold((rx, names), |(mut rx, names)| async move {
                loop {
                    match rx.recv().await {
                        Ok((channel, payload)) if names.contains(&channel) => {
                            return Some((payload, (rx, names)));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("realtime subscriber lagged by {n} events");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            });
            Ok(stream.boxed())
        })
    }
}
