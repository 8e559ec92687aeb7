//! Configuration management for the fleet daemon.
//!
//! This module handles loading and validation of the daemon configuration
//! from a TOML file, and exposes the `[fleet]` table as the
//! [`FleetSettings`] consumed by the orchestration core.

use anyhow::Context;
use fleet_control::FleetSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn default_bind_address() -> String {
    "127.0.0.1:25580".to_string()
}

fn default_control_channel() -> String {
    "mcmg:main".to_string()
}

fn default_instance_host() -> String {
    "127.0.0.1".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
///
/// Encompasses the control listener, fleet orchestration, health probing
/// and logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Control listener settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Fleet orchestration settings
    #[serde(default)]
    pub fleet: FleetSection,
    /// Health probe settings
    #[serde(default)]
    pub probe: ProbeSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Control listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address backends connect to (e.g., "127.0.0.1:25580")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Channel identifier carrying fleet-control messages
    #[serde(default = "default_control_channel")]
    pub control_channel: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            control_channel: default_control_channel(),
        }
    }
}

/// The `[fleet]` table: orchestration settings plus where instances live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSection {
    /// Host every managed instance listens on
    #[serde(default = "default_instance_host")]
    pub instance_host: String,
    #[serde(flatten)]
    pub settings: FleetSettings,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            instance_host: default_instance_host(),
            settings: FleetSettings::default(),
        }
    }
}

/// Status-ping probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Upper bound on one probe, connect through response
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.control_channel.is_empty() {
            return Err("Control channel cannot be empty".to_string());
        }

        if self.fleet.instance_host.is_empty() {
            return Err("Instance host cannot be empty".to_string());
        }

        self.fleet.settings.validate()?;

        if self.probe.timeout_ms == 0 {
            return Err("Probe timeout must be greater than zero".to_string());
        }

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
