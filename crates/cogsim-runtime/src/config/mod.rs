//! Runtime configuration with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌─────────────────────────────────────────────┐
//! │  1. Environment Variables (COGSIM_*)        │  Runtime override
//! ├─────────────────────────────────────────────┤
//! │  2. Project Config (.cogsim/config.toml)    │  Experiment-specific
//! ├─────────────────────────────────────────────┤
//! │  3. Global Config (~/.cogsim/config.toml)   │  User defaults
//! ├─────────────────────────────────────────────┤
//! │  4. Default Values (compile-time)           │  Fallback
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `COGSIM_DEBUG` | `debug` | bool |
//! | `COGSIM_CYCLE_TIME` | `scheduler.cycle_time` | f64 seconds |
//! | `COGSIM_MAX_CYCLES` | `scheduler.max_cycles` | u64 |
//! | `COGSIM_MAX_TIME` | `scheduler.max_time` | f64 seconds |
//!
//! # Example Configuration
//!
//! ```toml
//! debug = false
//!
//! [scheduler]
//! cycle_time = 0.05
//! idle_increment = 0.05
//! max_cycles = 10000
//!
//! [dispatch]
//! queue_capacity = 1024
//!
//! [connector]
//! handshake_timeout_ms = 5000
//! shutdown_timeout_ms = 2000
//! link_buffer = 256
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{CogsimConfig, ConnectorConfig, DispatchConfig, SchedulerConfig};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".cogsim")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".cogsim";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
