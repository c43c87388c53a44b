//! Configuration type definitions.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
///
/// All fields fall back to their defaults when absent from a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CogsimConfig {
    /// Enables debug logging in the CLI.
    pub debug: bool,

    /// Cognitive cycle timing and run limits.
    pub scheduler: SchedulerConfig,

    /// Asynchronous listener delivery.
    pub dispatch: DispatchConfig,

    /// Environment connector transport and handshake.
    pub connector: ConnectorConfig,
}

impl CogsimConfig {
    /// Serializes to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Fields in `other` that differ from their defaults override `self`.
    pub fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.debug != default.debug {
            self.debug = other.debug;
        }

        self.scheduler.merge(&other.scheduler);
        self.dispatch.merge(&other.dispatch);
        self.connector.merge(&other.connector);
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    field,
                    message: format!("must be a positive number of seconds, got {v}"),
                })
            }
        };

        positive("scheduler.cycle_time", self.scheduler.cycle_time)?;
        positive("scheduler.idle_increment", self.scheduler.idle_increment)?;
        if let Some(max_time) = self.scheduler.max_time {
            positive("scheduler.max_time", max_time)?;
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.queue_capacity",
                message: "must be at least 1".into(),
            });
        }
        if self.connector.link_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connector.link_buffer",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Scheduler configuration.
///
/// Times are simulated seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time consumed by a firing cycle unless the production overrides it.
    pub cycle_time: f64,

    /// Time consumed by a cycle in which nothing fired.
    pub idle_increment: f64,

    /// Stop a model as completed after this many cycles.
    pub max_cycles: Option<u64>,

    /// Stop a model as completed once its clock reaches this time.
    pub max_time: Option<f64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_time: 0.05,
            idle_increment: 0.05,
            max_cycles: None,
            max_time: None,
        }
    }
}

impl SchedulerConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if (other.cycle_time - default.cycle_time).abs() > f64::EPSILON {
            self.cycle_time = other.cycle_time;
        }
        if (other.idle_increment - default.idle_increment).abs() > f64::EPSILON {
            self.idle_increment = other.idle_increment;
        }
        if other.max_cycles.is_some() {
            self.max_cycles = other.max_cycles;
        }
        if other.max_time.is_some() {
            self.max_time = other.max_time;
        }
    }
}

/// Dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Capacity of each task queue created by the runtime.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: cogsim_event::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DispatchConfig {
    fn merge(&mut self, other: &Self) {
        if other.queue_capacity != Self::default().queue_capacity {
            self.queue_capacity = other.queue_capacity;
        }
    }
}

/// Connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectorConfig {
    /// How long a participant waits for `Welcome` after `Hello`.
    pub handshake_timeout_ms: u64,

    /// How long the authority waits for disconnect acknowledgements.
    pub shutdown_timeout_ms: u64,

    /// Envelope capacity of each link direction.
    pub link_buffer: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 5_000,
            shutdown_timeout_ms: 2_000,
            link_buffer: 256,
        }
    }
}

impl ConnectorConfig {
    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Shutdown timeout as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.handshake_timeout_ms != default.handshake_timeout_ms {
            self.handshake_timeout_ms = other.handshake_timeout_ms;
        }
        if other.shutdown_timeout_ms != default.shutdown_timeout_ms {
            self.shutdown_timeout_ms = other.shutdown_timeout_ms;
        }
        if other.link_buffer != default.link_buffer {
            self.link_buffer = other.link_buffer;
        }
    }
}
