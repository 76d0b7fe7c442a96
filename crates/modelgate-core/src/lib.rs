//! Configuration loading and runtime metrics.

pub mod config;
pub mod metrics;

pub use config::{Config, ConfigError};
pub use metrics::{MetricsCollector, MetricsSnapshot};
