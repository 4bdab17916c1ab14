use thiserror::Error;

#[derive(Error, Debug)]
pub enum AbPulseError {
    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Frequency must be between {min}ms and {max}ms, got {got}")]
    FrequencyOutOfRange { got: u64, min: u64, max: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Result type alias for analytics operations
pub type Result<T> = std::result::Result<T, AbPulseError>;

impl AbPulseError {
    /// Creates a new data source error
    pub fn data_source<S: Into<String>>(msg: S) -> Self {
        Self::DataSource(msg.into())
    }

    /// Creates a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new authentication error
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Self::Auth(msg.into())
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DataSource(_) | Self::Timeout { .. } | Self::ChannelSend
        )
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::DataSource(_) => "data_source",
            Self::Validation(_) | Self::FrequencyOutOfRange { .. } => "validation",
            Self::Config(_) => "config",
            Self::Auth(_) => "auth",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
            Self::ChannelSend => "channel",
            Self::Timeout { .. } => "timeout",
        }
    }
}
