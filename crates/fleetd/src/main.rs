//! Main application entry point for the fleet daemon.
//!
//! Loads configuration, sets up logging, binds the control listener and
//! runs until a shutdown signal arrives.

mod cli;
mod config;
mod connection;
mod frame;
mod host;
mod server;
mod signals;
mod status_ping;

use anyhow::{anyhow, Context};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};
use connection::ConnectionManager;
use fleet_control::{create_dispatcher, FleetDispatcher};
use host::TcpFleetHost;
use server::ControlServer;

/// Interval between fleet status log lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn setup_logging(config: &LoggingSettings) -> anyhow::Result<()> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(fmt::layer().json().with_file(false).with_line_number(false))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_file(false).with_line_number(false))
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// The running daemon.
pub struct Application {
    config: AppConfig,
    server: ControlServer,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<FleetDispatcher>,
}

impl Application {
    /// Loads configuration and wires up every component.
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

        setup_logging(&config.logging)?;

        let connections = Arc::new(ConnectionManager::new());
        let host = TcpFleetHost::new(
            &config.fleet.settings,
            config.fleet.instance_host.clone(),
            config.probe.timeout(),
            connections.clone(),
        )?;
        info!(
            "📂 Config: {} | {} known instances on {}",
            args.config_path.display(),
            host.instance_count(),
            config.fleet.instance_host
        );

        let dispatcher = Arc::new(create_dispatcher(
            Arc::new(host),
            &config.fleet.settings,
            config.server.control_channel.clone(),
        ));

        let bind_address = config
            .server
            .bind_address
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address {}", config.server.bind_address))?;
        let server = ControlServer::bind(bind_address, connections.clone(), dispatcher.clone()).await?;

        Ok(Self {
            config,
            server,
            connections,
            dispatcher,
        })
    }

    /// Runs until SIGINT/SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = &self.config.fleet.settings;
        info!("🌟 Starting fleet daemon");
        info!("📋 Configuration Summary:");
        info!("  🌐 Control listener: {}", self.server.local_addr()?);
        info!("  📨 Control channel: {}", self.config.server.control_channel);
        info!("  📁 Instance root: {}", settings.instance_root.display());
        for (instance_type, ceiling) in &settings.max_instances {
            info!("  🎮 {}: up to {} instances", instance_type, ceiling);
        }
        info!(
            "  ⏱️ Provisioning cooldown: {}s ({:?})",
            settings.cooldown_secs, settings.cooldown_policy
        );

        let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);
        let server_handle = tokio::spawn(self.server.run(shutdown_receiver));

        let monitoring_handle = {
            let connections = self.connections.clone();
            let dispatcher = self.dispatcher.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATUS_INTERVAL);
                interval.tick().await;

                loop {
                    interval.tick().await;
                    let snapshot = dispatcher.registry().snapshot().await;
                    let held = dispatcher.lifecycle().lock().held_types();
                    info!(
                        "📊 Fleet status - {} backends connected | {} instances online | {} types cooling down",
                        connections.connection_count(),
                        snapshot.len(),
                        held.len()
                    );
                }
            })
        };

        info!("✅ Fleet daemon is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        signals::wait_for_shutdown_signal().await?;

        info!("🛑 Shutdown signal received, initiating graceful shutdown...");
        monitoring_handle.abort();
        let _ = shutdown_sender.send(());

        if let Err(e) = server_handle.await {
            error!("❌ Control listener task failed: {}", e);
        }

        info!("👋 Fleet daemon stopped");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let app = Application::new(args).await?;
    app.run().await
}
