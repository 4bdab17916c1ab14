//! Configuration management for abpulse.
//!
//! This module provides comprehensive configuration handling with:
//! - YAML file support
//! - Environment variable overrides
//! - CLI argument overrides
//! - Validation and defaults

use crate::core::{AbPulseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

/// Complete configuration for abpulse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP/WebSocket server configuration
    pub server: ServerConfig,
    /// Metrics store access configuration
    pub store: StoreConfig,
    /// Aggregation cache configuration
    pub cache: CacheConfig,
    /// Alert engine configuration
    pub alerts: AlertsConfig,
    /// Real-time broadcast configuration
    pub realtime: RealtimeConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for the HTTP API and WebSocket endpoint
    pub http_port: u16,
    /// Bind address
    pub bind_address: IpAddr,
    /// Maximum concurrent WebSocket connections
    pub max_connections: usize,
}

/// Metrics store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Key prefix under which test hashes live
    pub test_key_prefix: String,
    /// Timeout applied to every store call
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

/// Aggregation cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for every cached aggregation result
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

/// Alert engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Rule evaluation interval
    #[serde(with = "humantime_serde")]
    pub evaluation_interval: Duration,
    /// Significance threshold for the significance_achieved rule (0-1)
    pub significance_threshold: f64,
    /// Lift threshold for the winner_detected rule (fraction, e.g. 0.20)
    pub winner_lift_threshold: f64,
    /// Lift threshold for the underperforming rule (fraction, e.g. -0.10)
    pub underperform_lift_threshold: f64,
    /// Suppress re-firing while an unacknowledged alert with the same
    /// (kind, test) exists
    pub deduplicate: bool,
}

/// Real-time broadcast configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Default per-client push frequency
    #[serde(with = "humantime_serde")]
    pub default_frequency: Duration,
    /// Minimum accepted per-client frequency
    #[serde(with = "humantime_serde")]
    pub min_frequency: Duration,
    /// Maximum accepted per-client frequency
    #[serde(with = "humantime_serde")]
    pub max_frequency: Duration,
    /// Heartbeat timer interval
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Connections silent for longer than this are reaped
    #[serde(with = "humantime_serde")]
    pub stale_threshold: Duration,
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token -> user id
    pub tokens: HashMap<String, String>,
    /// Accepted API keys
    pub api_keys: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: LogLevel,
    /// Structured (compact, targets, line numbers) output
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            alerts: AlertsConfig::default(),
            realtime: RealtimeConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http_port: 8080,
            bind_address: "0.0.0.0".parse().expect("Valid default IP address"),
            max_connections: 1000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            test_key_prefix: "ab:test:".to_string(),
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl: Duration::from_secs(300), // 5 minutes, global for all entry kinds
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        AlertsConfig {
            evaluation_interval: Duration::from_secs(30),
            significance_threshold: 0.95,
            winner_lift_threshold: 0.20,
            underperform_lift_threshold: -0.10,
            deduplicate: true,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        RealtimeConfig {
            default_frequency: Duration::from_secs(5),
            min_frequency: Duration::from_secs(1),
            max_frequency: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(60),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(AbPulseError::config("max_connections must be greater than 0"));
        }

        if self.cache.ttl.is_zero() {
            return Err(AbPulseError::config("cache ttl must be greater than 0"));
        }

        if self.alerts.significance_threshold < 0.0 || self.alerts.significance_threshold > 1.0 {
            return Err(AbPulseError::config(format!(
                "significance_threshold must be between 0 and 1, got {}",
                self.alerts.significance_threshold
            )));
        }

        if self.alerts.winner_lift_threshold <= 0.0 {
            return Err(AbPulseError::config(
                "winner_lift_threshold must be positive",
            ));
        }

        if self.alerts.underperform_lift_threshold >= 0.0 {
            return Err(AbPulseError::config(
                "underperform_lift_threshold must be negative",
            ));
        }

        if self.realtime.min_frequency > self.realtime.max_frequency {
            return Err(AbPulseError::config(format!(
                "min_frequency {:?} exceeds max_frequency {:?}",
                self.realtime.min_frequency, self.realtime.max_frequency
            )));
        }

        if self.realtime.default_frequency < self.realtime.min_frequency
            || self.realtime.default_frequency > self.realtime.max_frequency
        {
            return Err(AbPulseError::config(
                "default_frequency must lie within [min_frequency, max_frequency]",
            ));
        }

        if self.realtime.stale_threshold < self.realtime.heartbeat_interval {
            return Err(AbPulseError::config(
                "stale_threshold must be at least one heartbeat_interval",
            ));
        }

        Ok(())
    }

    /// Check if a port is available
    pub async fn check_port_available(port: u16) -> Result<()> {
        use tokio::net::TcpListener;

        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(_) => Ok(()),
            Err(e) => Err(AbPulseError::config(format!("Port {} is not available: {}", port, e))),
        }
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| AbPulseError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set HTTP port
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.server.http_port = port;
        self
    }

    /// Set cache TTL
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    /// Set alert evaluation interval
    pub fn evaluation_interval(mut self, interval: Duration) -> Self {
        self.config.alerts.evaluation_interval = interval;
        self
    }

    /// Set default broadcast frequency
    pub fn default_frequency(mut self, frequency: Duration) -> Self {
        self.config.realtime.default_frequency = frequency;
        self
    }

    /// Register a bearer token for a user
    pub fn token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.config.auth.tokens.insert(token.into(), user_id.into());
        self
    }

    /// Register an accepted API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.auth.api_keys.push(key.into());
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
