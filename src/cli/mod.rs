//! Command-line interface for abpulse.
//!
//! Run `abpulse` to serve the analytics API with sensible defaults; pass
//! `--demo` to preload a sample experiment into the in-memory store.

use crate::application::{seed_demo_data, Application};
use crate::core::{AbPulseError, Config, Result};
use crate::store::MemoryMetricsStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Real-time A/B testing analytics engine
#[derive(Parser, Debug)]
#[command(name = "abpulse")]
#[command(version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Port for the HTTP API and WebSocket endpoint
    #[arg(long, env = "ABPULSE_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Configuration file path (default: ~/.config/abpulse/config.yaml)
    #[arg(short, long, env = "ABPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Preload a sample experiment into the in-memory store
    #[arg(long, env = "ABPULSE_DEMO")]
    pub demo: bool,

    /// Enable debug logging
    #[arg(short, long, env = "ABPULSE_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Show version information
    #[arg(short = 'V', long = "show-version")]
    pub version: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        use crate::core::config::ConfigBuilder;

        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("abpulse").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/abpulse/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                // User explicitly specified a config file that doesn't exist
                return Err(AbPulseError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(
        &self,
        mut builder: crate::core::config::ConfigBuilder,
    ) -> Result<Config> {
        if let Some(port) = self.http_port {
            builder = builder.http_port(port);
        }
        builder = builder.debug(self.debug);
        builder.build()
    }

    /// Initialize logging based on flags and environment.
    pub fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level =
            std::env::var("ABPULSE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_level = if self.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(self.debug)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| AbPulseError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the abpulse application.
pub async fn execute(cli: Cli) -> Result<()> {
    if cli.version {
        println!("abpulse {}", env!("CARGO_PKG_VERSION"));
        println!("Real-time A/B testing analytics engine");
        return Ok(());
    }

    cli.init_logging()?;

    let config = cli.load_config().await?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  HTTP port: {}", config.server.http_port);
        println!("  Cache TTL: {:?}", config.cache.ttl);
        println!("  Alert interval: {:?}", config.alerts.evaluation_interval);
        println!("  Default push frequency: {:?}", config.realtime.default_frequency);
        return Ok(());
    }

    // Fail fast with a clear message instead of erroring deep in serve().
    Config::check_port_available(config.server.http_port).await?;

    let store = Arc::new(MemoryMetricsStore::new());
    if cli.demo {
        seed_demo_data(&store);
        tracing::info!("demo experiment loaded");
    }

    let app = Application::new(config, store)?;
    app.run().await
}
