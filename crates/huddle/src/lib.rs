//! # Huddle Presence Server - Main Entry Point
//!
//! Real-time presence server for 2D virtual-world meetings: occupants hold
//! cells on a room grid, watch each other move, and are paired into peer
//! audio/video sessions when their avatars come within range. This entry
//! point handles CLI parsing, configuration loading, and application
//! lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! huddle
//!
//! # Specify custom configuration
//! huddle --config production.toml
//!
//! # Override specific settings
//! huddle --bind 0.0.0.0:8080 --store-url redis://store:6379 --log-level debug
//!
//! # JSON logging for production
//! huddle --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The server handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)
//!
//! ## Architecture
//!
//! * **Stateless Process Instances**: room authority lives in the shared
//!   store; any number of instances can serve the same rooms
//! * **Injected Backends**: the store, event bus and token verifier are
//!   constructed once at startup and handed to the gateway
//! * **Event-Driven**: lifecycle events fan out over room channels, and
//!   point-to-point payloads ride process channels

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the Huddle Presence Server.
///
/// Handles the complete application lifecycle including:
/// 1. Command-line argument parsing
/// 2. Configuration loading and validation
/// 3. Logging system initialization
/// 4. Application creation and execution
/// 5. Error handling and cleanup
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
///
/// Note: This function is called from an async context (main with #[tokio::main]),
/// so it should NOT have #[tokio::main] itself.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments first
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    // Create and run application
    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use config::{AuthSettings, LoggingSettings, ServerSettings, StoreBackend, StoreSettings};
