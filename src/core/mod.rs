//! Core domain models and shared infrastructure for abpulse.
//!
//! This module contains the fundamental types that power the analytics
//! aggregation and alerting pipeline.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{AbPulseError, Result};
pub use types::{
    AlertKind, AlertSeverity, ExecutiveSummary, PsychographicInsights, RealTimeAlert,
    RealTimeMetrics, RevenueAttribution, RevenueMetrics, TestFilters, TestMetrics, TestStatus,
    VariationMetrics,
};
