//! # OllamaServe
//!
//! Supervised local Ollama serving with unified metrics access.
//!
//! OllamaServe manages the lifecycle of a local Ollama server process,
//! verifies it is network-reachable before reporting it usable, and exposes
//! one query surface over the metrics and request logs collected from it,
//! regardless of which storage engine holds them.
//!
//! ## Architecture
//!
//! - **Service**: process supervision and availability probing
//! - **Storage**: ClickHouse or PostgreSQL behind a single query interface
//! - **API**: REST API for current stats, history, logs, and model usage
//!
//! ## Quick Start
//!
//! ```bash
//! # Supervise a local Ollama server and serve the monitoring API
//! ollamaserve serve
//!
//! # One-shot health probe
//! ollamaserve health
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use config::{BackendConfig, ConnectionConfig};
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::{BackendConfig, ConnectionConfig, ExporterKind};
    pub use crate::db::{MetricsRouter, StatsBackend};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::service::{OllamaService, Prober, ServiceState};
}
