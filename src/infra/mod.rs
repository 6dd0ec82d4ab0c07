//! Infrastructure - configuration and metrics
//!
//! - `config` - Application configuration (TOML/JSON loading, defaults)
//! - `metrics` - Lock-free counters

pub mod config;
pub mod metrics;

pub use config::{Config, NOT_CONFIGURED_MESSAGE};
pub use metrics::{Metrics, MetricsSummary};
