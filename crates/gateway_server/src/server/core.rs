//! Core gateway implementation.
//!
//! This module contains the main `GatewayServer` struct and its
//! implementation, wiring the injected store, bus and token verifier to the
//! accept loop, the per-room tasks and the bus consumer.

use crate::{
    auth::TokenVerifier,
    config::GatewayConfig,
    connection::ConnectionManager,
    error::GatewayError,
    rooms::RoomDirectory,
    server::handlers::{handle_bus_message, handle_connection},
};
use huddle_room_system::{EventBus, ProcessId, RoomStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Shared state handed to every connection handler and room task.
///
/// Built once in [`GatewayServer::new`] and never mutated afterwards; all
/// interior state lives behind its components' own synchronization.
pub(crate) struct GatewayContext {
    /// Gateway configuration settings
    pub config: GatewayConfig,

    /// This process's identity in the registry and on proc channels
    pub process_id: ProcessId,

    /// Manager for client connections and messaging
    pub connections: Arc<ConnectionManager>,

    /// The authoritative distributed room store
    pub store: Arc<dyn RoomStore>,

    /// The cross-process event fabric
    pub bus: Arc<dyn EventBus>,

    /// Verifier for the tokens room verbs carry
    pub verifier: Arc<dyn TokenVerifier>,

    /// Directory of the rooms this process serves
    pub rooms: RoomDirectory,
}

/// The core gateway structure.
///
/// `GatewayServer` owns the WebSocket accept loop and the consumer of this
/// process's bus subscription. All room state authority lives in the
/// injected [`RoomStore`]; the gateway holds only disposable projections
/// (per-room caches) and per-connection session state.
///
/// # Architecture
///
/// * **Connection Management**: WebSocket connection lifecycle and sessions
/// * **Verb Handling**: room lifecycle, movement and signaling verbs
/// * **Room Tasks**: one task per locally-served room for ordered fan-out
/// * **Bus Consumer**: applies relayed room events and delivers proc events
///
/// The server is cheap to clone; clones share the same state and shutdown
/// channel.
#[derive(Clone)]
pub struct GatewayServer {
    context: Arc<GatewayContext>,

    /// Channel for coordinating gateway shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl GatewayServer {
    /// Creates a new gateway with the specified configuration and backends.
    ///
    /// The store, bus and verifier are injected so deployments can pick the
    /// Redis-backed pair while tests run against the in-memory twins. The
    /// gateway is ready to start after construction.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn RoomStore>,
        bus: Arc<dyn EventBus>,
        verifier: Arc<dyn TokenVerifier>,
        process_id: ProcessId,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new());
        let rooms = RoomDirectory::new(
            connections.clone(),
            store.clone(),
            bus.clone(),
            config.proximity,
        );
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            context: Arc::new(GatewayContext {
                config,
                process_id,
                connections,
                store,
                bus,
                verifier,
                rooms,
            }),
            shutdown_sender,
        }
    }

    /// Starts the gateway on its configured bind address.
    ///
    /// Binds the listener and then runs until shutdown is requested. See
    /// [`serve`](Self::serve) for the running behavior.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(self.context.config.bind_address)
            .await
            .map_err(|e| GatewayError::Network(format!("Failed to bind listener: {e}")))?;
        self.serve(listener).await
    }

    /// Runs the gateway on an already-bound listener.
    ///
    /// # Startup Sequence
    ///
    /// 1. Subscribe to this process's bus channels and start the consumer
    /// 2. Accept connections, spawning one handler per client
    /// 3. On shutdown, stop accepting, close client sockets and wait for
    ///    their departure handling to drain
    ///
    /// # Returns
    ///
    /// `Ok(())` once the gateway has stopped cleanly, or a `GatewayError`
    /// if startup failed.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Network(format!("Listener has no local address: {e}")))?;
        info!("🚀 Starting gateway on {}", local_addr);
        info!("🌍 Process ID: {}", self.context.process_id);

        // Subscribe before accepting, so no relayed event can slip past
        // between the first join and the consumer starting.
        let mut bus_messages = self.context.bus.subscribe().await?;
        let consumer_context = self.context.clone();
        let mut consumer_shutdown = self.shutdown_sender.subscribe();
        let consumer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = bus_messages.recv() => {
                        match message {
                            Some(message) => handle_bus_message(&consumer_context, message).await,
                            None => {
                                warn!("⚠️ Bus subscription ended");
                                break;
                            }
                        }
                    }
                    _ = consumer_shutdown.recv() => break,
                }
            }
        });

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            if self.context.connections.connection_count().await
                                >= self.context.config.max_connections
                            {
                                warn!("⚠️ Refusing connection from {}: at capacity", addr);
                                continue;
                            }
                            let context = self.context.clone();
                            let handler_shutdown = self.shutdown_sender.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_connection(stream, addr, context, handler_shutdown).await
                                {
                                    error!("Connection error: {:?}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            break;
                        }
                    }
                }
                _ = shutdown_receiver.recv() => {
                    info!("Internal shutdown signal received");
                    break;
                }
            }
        }

        info!("🧹 Performing gateway cleanup...");
        // Connection handlers received the shutdown signal and are closing
        // their sockets, which drives each session through the normal
        // departure path. Give those store removals a moment to land.
        for _ in 0..20 {
            if self.context.connections.connection_count().await == 0 {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
        consumer.abort();
        info!("✅ Gateway cleanup completed");

        info!("Gateway stopped");
        Ok(())
    }

    /// Initiates gateway shutdown.
    ///
    /// Signals the accept loop, the bus consumer and every connection
    /// handler to begin graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        info!("🛑 Shutting down gateway...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Number of currently connected clients.
    pub async fn connection_count(&self) -> usize {
        self.context.connections.connection_count().await
    }

    /// Number of rooms this process currently serves.
    pub fn room_count(&self) -> usize {
        self.context.rooms.room_count()
    }
}
