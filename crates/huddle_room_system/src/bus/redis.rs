//! Redis Pub/Sub backend for the event bus.
//!
//! Publishing goes through the shared multiplexed connection. Subscribing
//! opens one dedicated pub/sub connection per process (Redis dedicates a
//! connection to subscriber mode), registered for the process's own channel
//! exactly and for the room pattern, and forwards decoded frames into the
//! gateway's queue.
//!
//! Every process also receives its own room publishes back through the
//! pattern subscription; the decoder drops those by the frame's origin tag,
//! so the subscription stream only carries other processes' events.

use super::{
    decode_frame, proc_channel, room_channel, BusMessage, EventBus, RoomFrame,
    ROOM_CHANNEL_PATTERN,
};
use crate::error::BusError;
use crate::events::{ProcEvent, RoomEvent};
use crate::types::{ProcessId, RoomId};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Queue between the pub/sub reader task and the gateway's bus loop.
const SUBSCRIBER_QUEUE: usize = 1024;

/// Event bus over Redis Pub/Sub.
pub struct RedisEventBus {
    client: redis::Client,
    publisher: MultiplexedConnection,
    process_id: ProcessId,
}

impl RedisEventBus {
    /// Connects the publishing side and keeps the client around for the
    /// pub/sub connection opened by [`subscribe`](EventBus::subscribe).
    pub async fn connect(url: &str, process_id: ProcessId) -> Result<Self, BusError> {
        let client = redis::Client::open(url)
            .map_err(|e| BusError::Publish(format!("invalid bus url: {e}")))?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Publish(format!("bus connect: {e}")))?;
        info!("📡 Connected event bus for process {}", process_id);
        Ok(Self {
            client,
            publisher,
            process_id,
        })
    }

    async fn publish(&self, channel: String, payload: String) -> Result<(), BusError> {
        let mut conn = self.publisher.clone();
        let _receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish_room(&self, room: &RoomId, event: &RoomEvent) -> Result<(), BusError> {
        let frame = RoomFrame {
            origin: self.process_id,
            event: event.clone(),
        };
        let payload =
            serde_json::to_string(&frame).map_err(|e| BusError::Publish(e.to_string()))?;
        self.publish(room_channel(room), payload).await
    }

    async fn publish_proc(&self, process: ProcessId, event: &ProcEvent) -> Result<(), BusError> {
        let payload =
            serde_json::to_string(event).map_err(|e| BusError::Publish(e.to_string()))?;
        self.publish(proc_channel(process), payload).await
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Closed(format!("pub/sub connect: {e}")))?;
        pubsub
            .subscribe(proc_channel(self.process_id))
            .await
            .map_err(|e| BusError::Closed(format!("proc subscribe: {e}")))?;
        pubsub
            .psubscribe(ROOM_CHANNEL_PATTERN)
            .await
            .map_err(|e| BusError::Closed(format!("room subscribe: {e}")))?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let self_process = self.process_id;

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let channel = message.get_channel_name().to_string();
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("❌ Unreadable bus payload on '{}': {}", channel, e);
                        continue;
                    }
                };
                let Some(decoded) = decode_frame(&channel, &payload, self_process) else {
                    continue;
                };
                if tx.send(decoded).await.is_err() {
                    break;
                }
            }
            warn!(
                "⚠️ Bus subscription for process {} ended; caches stop converging",
                self_process
            );
        });

        Ok(rx)
    }
}
