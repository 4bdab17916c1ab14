//! abpulse - Real-time A/B testing analytics engine.
//!
//! abpulse turns raw experiment counters held in a key-value metrics store
//! into derived analytics views, threshold alerts, and a room-based
//! WebSocket broadcast stream for live dashboards.
//!
//! # Features
//!
//! - **Derived Views**: Per-test metrics, executive summaries, psychographic
//!   and revenue rollups, all memoized through a TTL cache
//! - **Alerting**: Periodic threshold rules over active tests with
//!   de-duplication and acknowledgement
//! - **Real-time Push**: Room-based WebSocket broadcasting with per-client
//!   frequency negotiation and heartbeat reaping
//! - **Zero Configuration**: Works out of the box with sensible defaults
//!
//! # Architecture
//!
//! abpulse is built with a modular architecture:
//! - `store`: Metrics store contract and in-memory implementation
//! - `aggregation`: Cached derivation of analytics views
//! - `alerts`: Threshold rule evaluation and the alert table
//! - `realtime`: WebSocket rooms, auth, and broadcast timers
//! - `api`: HTTP endpoints and the server-sent event stream
//! - `cli`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use abpulse::core::Config;
//! use abpulse::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Application::in_memory(config)?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod aggregation;
pub mod alerts;
pub mod api;
pub mod application;
pub mod cli;
pub mod core;
pub mod events;
pub mod realtime;
pub mod store;

// Re-export the entry points for convenience
pub use crate::application::Application;
pub use crate::core::{Config, Result};
