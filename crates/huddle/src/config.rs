//! Configuration management for the huddle presence server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use gateway_server::GatewayConfig;
use huddle_room_system::ProximityConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Default for max_connections
fn default_max_connections() -> usize {
    1000
}

/// Default store request timeout. The store is on the hot path of every
/// verb, so unavailability must surface as a fast failure, not a hang.
fn default_request_timeout_ms() -> u64 {
    500
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all server settings
/// including networking, the distributed store, proximity rules, authentication,
/// and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Distributed store and event bus settings
    pub store: StoreSettings,
    /// Proximity rules applied to the rooms this process serves
    #[serde(default)]
    pub proximity: ProximityConfig,
    /// Token verification settings
    pub auth: AuthSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls network binding and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Which backend holds room state and carries events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis store and pub/sub; required when multiple process instances
    /// share rooms behind a load balancer
    Redis,
    /// In-process store and loopback bus; single-instance deployments only
    Memory,
}

/// Distributed store and event bus configuration.
///
/// One URL serves both concerns: the scripted-transaction store connection
/// and the pub/sub connections of the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Backend selection
    pub backend: StoreBackend,
    /// Connection URL for the redis backend
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Per-request timeout in milliseconds; a transaction that does not
    /// answer within this window fails closed with nothing applied
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Token verification configuration.
///
/// The server never mints tokens; it verifies tokens minted by the
/// platform's account service against this shared secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HS256 shared secret for session token verification
    pub token_secret: String,
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: default_max_connections(),
            },
            store: StoreSettings {
                backend: StoreBackend::Memory,
                url: default_store_url(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            proximity: ProximityConfig::default(),
            auth: AuthSettings {
                token_secret: "change-me".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a gateway configuration.
    ///
    /// This method translates the TOML-based configuration into the types
    /// expected by the gateway library.
    ///
    /// # Returns
    ///
    /// A `GatewayConfig` instance ready for use with the gateway.
    pub fn to_gateway_config(&self) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
        Ok(GatewayConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            proximity: self.proximity,
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks network addresses, store settings, proximity rules, and other
    /// configuration values for validity.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        // Validate bind address
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        // Validate store settings
        if self.store.backend == StoreBackend::Redis && !self.store.url.starts_with("redis://") {
            return Err(format!("Invalid store URL: {}", &self.store.url));
        }
        if self.store.request_timeout_ms == 0 {
            return Err("store.request_timeout_ms must be greater than 0".to_string());
        }

        // Validate proximity rules
        if self.proximity.radius <= 0.0 {
            return Err("proximity.radius must be greater than 0".to_string());
        }
        if self.proximity.max_peers == 0 {
            return Err("proximity.max_peers must be greater than 0".to_string());
        }

        // Validate auth settings
        if self.auth.token_secret.is_empty() {
            return Err("auth.token_secret cannot be empty".to_string());
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
