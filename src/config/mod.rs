//! Configuration module for noise-sentry.
//!
//! Provides [`MonitorConfig`] (validated monitor settings with TOML
//! persistence) and [`AppPaths`] for cross-platform config locations.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{ConfigError, MonitorConfig, VadBackend};
