//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`~/.cogsim/config.toml`)
//! 3. Project config (`.cogsim/config.toml`)
//! 4. Environment variables (`COGSIM_*`)
//!
//! Each layer overrides the previous. The merged result is validated
//! before it is returned.

use super::{default_config_path, CogsimConfig, ConfigError, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use cogsim_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/path/to/experiment")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), cogsim_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    global_config_path: Option<PathBuf>,
    project_root: Option<PathBuf>,
    explicit_file: Option<PathBuf>,
    skip_env: bool,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Sets the project root directory.
    ///
    /// Project config will be loaded from `<project_root>/.cogsim/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Adds a file applied after the project config and before the
    /// environment. Unlike the other layers it must exist.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Skips project config loading.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file exists but cannot be read
    /// or parsed, an environment variable is malformed, or the merged
    /// values are out of range. Missing global/project files are ignored.
    pub fn load(&self) -> Result<CogsimConfig, ConfigError> {
        let mut config = CogsimConfig::default();

        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(global_config) = Self::load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global_config);
            }
        }

        if !self.skip_project {
            if let Some(ref project_root) = self.project_root {
                let project_config_path = project_root
                    .join(PROJECT_CONFIG_DIR)
                    .join(PROJECT_CONFIG_FILE);

                if let Some(project_config) = Self::load_file(&project_config_path)? {
                    debug!(path = %project_config_path.display(), "Loaded project config");
                    config.merge(&project_config);
                }
            }
        }

        if let Some(ref path) = self.explicit_file {
            let explicit = Self::load_file(path)?.ok_or_else(|| {
                ConfigError::read_file(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                )
            })?;
            debug!(path = %path.display(), "Loaded explicit config");
            config.merge(&explicit);
        }

        if !self.skip_env {
            Self::apply_env_vars(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Option<CogsimConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config =
            CogsimConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

        Ok(Some(config))
    }

    fn apply_env_vars(config: &mut CogsimConfig) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("COGSIM_DEBUG") {
            config.debug = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var("COGSIM_DEBUG", "expected bool"))?;
        }
        if let Some(v) = parse_env::<f64>("COGSIM_CYCLE_TIME", "expected seconds")? {
            config.scheduler.cycle_time = v;
        }
        if let Some(v) = parse_env::<u64>("COGSIM_MAX_CYCLES", "expected integer")? {
            config.scheduler.max_cycles = Some(v);
        }
        if let Some(v) = parse_env::<f64>("COGSIM_MAX_TIME", "expected seconds")? {
            config.scheduler.max_time = Some(v);
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &'static str, expected: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_env_var(name, format!("{expected}, got '{val}'"))),
        Err(_) => Ok(None),
    }
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off"
/// (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
