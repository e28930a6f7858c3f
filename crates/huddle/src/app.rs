//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that orchestrates
//! backend construction, server startup, monitoring, and graceful shutdown.

use crate::{
    cli::CliArgs,
    config::{AppConfig, StoreBackend},
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent},
};
use gateway_server::{GatewayServer, JwtVerifier};
use huddle_room_system::{
    EventBus, LocalEventBus, MemoryRoomStore, ProcessId, RedisEventBus, RedisRoomStore, RoomStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Main application struct managing the server lifecycle.
///
/// The `Application` struct manages the complete lifecycle of the huddle
/// server: configuration loading, backend construction, gateway startup,
/// health monitoring, and graceful shutdown handling.
///
/// # Architecture
///
/// * **Configuration Management**: Loads and validates configuration from files and CLI
/// * **Backend Construction**: Builds the store, bus and verifier once at startup
///   and injects them into the gateway; nothing connects lazily
/// * **Health Monitoring**: Periodic connection and room statistics
/// * **Graceful Shutdown**: Handles termination signals and phased cleanup
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// This process's identity in the registry and on its bus channel
    process_id: ProcessId,
    /// Gateway instance serving client sessions
    gateway: GatewayServer,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration, applies CLI overrides, validates settings,
    /// connects the configured backends and initializes the gateway.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Returns
    ///
    /// A configured `Application` instance ready to run, or an error if
    /// initialization failed.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Connect the store and event bus backends
    /// 6. Initialize the gateway with the injected backends
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Load configuration first (before logging setup)
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        if let Some(store_url) = args.store_url {
            config.store.url = store_url;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        // Validate configuration
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        // Display banner after logging is setup
        display_banner();

        // The process id is minted once here; the registry entries this
        // process writes and the proc channel it subscribes to carry it.
        let process_id = ProcessId::new();

        let (store, bus): (Arc<dyn RoomStore>, Arc<dyn EventBus>) = match config.store.backend {
            StoreBackend::Redis => {
                let timeout = Duration::from_millis(config.store.request_timeout_ms);
                let store = RedisRoomStore::connect(&config.store.url, timeout).await?;
                let bus = RedisEventBus::connect(&config.store.url, process_id).await?;
                info!("🗄️ Connected to store at {}", config.store.url);
                (Arc::new(store), Arc::new(bus))
            }
            StoreBackend::Memory => {
                warn!("🗄️ Using the in-memory store; other process instances will not see this one's rooms");
                (
                    Arc::new(MemoryRoomStore::new()),
                    Arc::new(LocalEventBus::new(process_id)),
                )
            }
        };
        let verifier = Arc::new(JwtVerifier::new(&config.auth.token_secret));

        let gateway = GatewayServer::new(
            config.to_gateway_config()?,
            store,
            bus,
            verifier,
            process_id,
        );

        info!("🚀 Huddle Presence Server v{}", env!("CARGO_PKG_VERSION"));
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self {
            config,
            process_id,
            gateway,
        })
    }

    /// Runs the application until a shutdown signal arrives.
    ///
    /// Starts the gateway, sets up monitoring, waits for a shutdown signal,
    /// and performs graceful cleanup.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the application ran and shut down successfully, or an error
    /// if there was a critical failure during execution.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Huddle Presence Server");
        self.log_configuration_summary();

        // Start the gateway in the background
        let server_handle = {
            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                match gateway.start().await {
                    Ok(()) => info!("✅ Gateway completed successfully"),
                    Err(e) => {
                        error!("❌ Gateway error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        // Periodic statistics for operators
        let monitoring_handle = {
            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                interval.tick().await;
                loop {
                    interval.tick().await;
                    info!(
                        "📊 System Health - {} connections | {} rooms served",
                        gateway.connection_count().await,
                        gateway.room_count()
                    );
                }
            })
        };

        info!("✅ Huddle Server is now running!");
        info!(
            "🎮 Ready to accept connections on {}",
            self.config.server.bind_address
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        // Wait for the shutdown signal
        wait_for_shutdown_signal().await?;

        // A second signal during cleanup means "stop now".
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up second-signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        // Phase 1: stop the periodic reporting noise.
        monitoring_handle.abort();

        // Phase 2: stop accepting, close client sockets, and let each
        // departing session run its store removal and leave event.
        info!("📡 Phase 1: Closing client sessions...");
        self.gateway.shutdown().await?;

        // Phase 3: wait for the gateway task to finish draining.
        info!("⏳ Phase 2: Waiting for the gateway to drain...");
        match tokio::time::timeout(Duration::from_secs(8), server_handle).await {
            Ok(_) => info!("✅ Gateway task completed gracefully"),
            Err(_) => warn!("⏰ Gateway did not drain within timeout, proceeding with shutdown"),
        }

        info!("✅ Huddle Presence Server shutdown complete");
        info!("👋 Process {} signing off", self.process_id);

        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  🗄️ Store backend: {:?}", self.config.store.backend);
        info!(
            "  ⏱️ Store request timeout: {}ms",
            self.config.store.request_timeout_ms
        );
        info!(
            "  🎧 Proximity: radius {} cells, up to {} peers",
            self.config.proximity.radius, self.config.proximity.max_peers
        );
        info!(
            "  👥 Max connections: {}",
            self.config.server.max_connections
        );
    }
}
