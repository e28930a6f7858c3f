//! In-process event bus.
//!
//! Loops published frames back through a broadcast channel. Single-instance
//! deployments get the full event flow without a Redis server, and tests
//! can wire several logical "processes" onto one fabric via [`LocalEventBus::peer`]
//! to exercise cross-process routing paths.
//!
//! Frames carry the same channel names and JSON payloads as the Redis
//! backend, so everything downstream of the seam behaves identically.

use super::{decode_frame, proc_channel, room_channel, BusMessage, EventBus, RoomFrame};
use crate::error::BusError;
use crate::events::{ProcEvent, RoomEvent};
use crate::types::{ProcessId, RoomId};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Frames buffered per subscriber before the oldest are dropped. Droppage
/// shows up as a lag warning, and the tolerant cache appliers absorb it.
const BUS_CAPACITY: usize = 4096;

/// Queue between the forwarding task and the gateway's bus loop.
const SUBSCRIBER_QUEUE: usize = 1024;

#[derive(Debug, Clone)]
struct Frame {
    channel: String,
    payload: String,
}

/// Loopback bus for one fabric of in-process "peers".
#[derive(Debug, Clone)]
pub struct LocalEventBus {
    process_id: ProcessId,
    sender: broadcast::Sender<Frame>,
}

impl LocalEventBus {
    /// Creates a new fabric with this process as its first peer.
    pub fn new(process_id: ProcessId) -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { process_id, sender }
    }

    /// A handle on the same fabric for another logical process. Used by
    /// tests to run two gateways against one loopback bus.
    pub fn peer(&self, process_id: ProcessId) -> Self {
        Self {
            process_id,
            sender: self.sender.clone(),
        }
    }

    fn send(&self, channel: String, payload: String) {
        // Zero receivers is a valid state (nobody subscribed yet), the same
        // as publishing to an unwatched Redis channel.
        let _ = self.sender.send(Frame { channel, payload });
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish_room(&self, room: &RoomId, event: &RoomEvent) -> Result<(), BusError> {
        let frame = RoomFrame {
            origin: self.process_id,
            event: event.clone(),
        };
        let payload =
            serde_json::to_string(&frame).map_err(|e| BusError::Publish(e.to_string()))?;
        self.send(room_channel(room), payload);
        Ok(())
    }

    async fn publish_proc(&self, process: ProcessId, event: &ProcEvent) -> Result<(), BusError> {
        let payload =
            serde_json::to_string(event).map_err(|e| BusError::Publish(e.to_string()))?;
        self.send(proc_channel(process), payload);
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let mut frames = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let self_process = self.process_id;

        tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => {
                        let Some(message) =
                            decode_frame(&frame.channel, &frame.payload, self_process)
                        else {
                            continue;
                        };
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "⚠️ Bus subscriber for process {} lagged, skipped {} frame(s)",
                            self_process, skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, SocketId, UserId};

    #[tokio::test]
    async fn room_frames_reach_other_peers_but_not_the_publisher() {
        let process_a = ProcessId::new();
        let process_b = ProcessId::new();
        let bus_a = LocalEventBus::new(process_a);
        let bus_b = bus_a.peer(process_b);

        let mut sub_a = bus_a.subscribe().await.expect("subscribe a");
        let mut sub_b = bus_b.subscribe().await.expect("subscribe b");

        let event = RoomEvent::Left {
            user_id: UserId::from("u"),
        };
        bus_a
            .publish_room(&RoomId::from("r"), &event)
            .await
            .expect("publish room event");
        // Marker addressed to the publisher, to prove its own room frame
        // was skipped rather than still in flight.
        let marker = ProcEvent::Far {
            to: SocketId::new(),
            user_id: UserId::from("u"),
            socket_id: SocketId::new(),
        };
        bus_a
            .publish_proc(process_a, &marker)
            .await
            .expect("publish marker");

        assert_eq!(
            sub_b.recv().await.expect("peer message"),
            BusMessage::Room {
                room_id: RoomId::from("r"),
                event,
            }
        );
        assert_eq!(
            sub_a.recv().await.expect("publisher message"),
            BusMessage::Proc(marker)
        );
    }

    #[tokio::test]
    async fn proc_frames_are_filtered_to_their_target() {
        let process_a = ProcessId::new();
        let process_b = ProcessId::new();
        let bus_a = LocalEventBus::new(process_a);
        let bus_b = bus_a.peer(process_b);

        let mut sub_a = bus_a.subscribe().await.expect("subscribe a");
        let mut sub_b = bus_b.subscribe().await.expect("subscribe b");

        let event = ProcEvent::Far {
            to: SocketId::new(),
            user_id: UserId::from("u"),
            socket_id: SocketId::new(),
        };
        bus_a
            .publish_proc(process_b, &event)
            .await
            .expect("publish proc event");
        // Marker the untargeted subscriber does see, to prove ordering.
        bus_a
            .publish_room(
                &RoomId::from("marker"),
                &RoomEvent::Moved {
                    user_id: UserId::from("u"),
                    position: Cell::new(1, 1),
                },
            )
            .await
            .expect("publish marker");

        assert_eq!(
            sub_b.recv().await.expect("targeted message"),
            BusMessage::Proc(event)
        );
        // Process a must get the marker first, never the proc frame.
        match sub_a.recv().await.expect("marker message") {
            BusMessage::Room { room_id, .. } => assert_eq!(room_id, RoomId::from("marker")),
            other => panic!("expected marker room frame, got {other:?}"),
        }
    }
}
