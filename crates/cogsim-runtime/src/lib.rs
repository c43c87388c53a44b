//! cogsim runtime: executes production-rule models in step with their
//! environment.
//!
//! # Crate Architecture
//!
//! ```text
//! cogsim-types    : ids, ErrorCode
//! cogsim-event    : EventDispatcher, TaskQueue
//! cogsim-runtime  : models, scheduler, controller, connector, locks   ◄── HERE
//! cogsim-cli      : the `cogsim` binary
//! ```
//!
//! Inside this crate, leaves first:
//!
//! ```text
//! model ──► connector ──► scheduler ──► controller ──► runtime
//!              └──► lock (table in the authority, steps on participants)
//! ```
//!
//! # Modules
//!
//! ## [`model`] - Working Memory and Productions
//!
//! - [`Model`](model::Model): a loaded model with buffers, clock and status
//! - [`ModelDefinition`](model::ModelDefinition) / [`ModelBuilder`](model::ModelBuilder): input
//! - [`ModelEvent`](model::ModelEvent): what a model publishes
//!
//! ## [`scheduler`] - Cognitive Cycle
//!
//! - [`Scheduler`](scheduler::Scheduler): match, resolve, fire, advance time
//! - [`ScoringFunction`](scheduler::ScoringFunction): conflict resolution plug-in
//!
//! ## [`controller`] - Lifecycle
//!
//! - [`Controller`](controller::Controller): start, stop, await a set of models
//! - [`CompletionReport`](controller::CompletionReport): per-model outcome
//!
//! ## [`connector`] - Environment
//!
//! - [`Authority`](connector::Authority): session clock, relay and locks
//! - [`Participant`](connector::Participant): one connection to an authority
//! - [`LocalClock`](connector::LocalClock) / [`AgentConnector`](connector::AgentConnector)
//!
//! ## [`lock`] - Named Locks
//!
//! - [`LockStep`](lock::LockStep) / [`UnlockStep`](lock::UnlockStep): experiment barriers
//!
//! ## [`harness`] - Experiments
//!
//! - [`ExperimentListener`](harness::ExperimentListener) / [`ExecutionTester`](harness::ExecutionTester)
//!
//! ## [`config`] - Configuration
//!
//! - [`CogsimConfig`](config::CogsimConfig) loaded by [`ConfigLoader`](config::ConfigLoader)
//!
//! Configuration priority: Environment > Project > Global > Default

pub mod config;
pub mod connector;
pub mod controller;
pub mod harness;
pub mod lock;
pub mod model;
mod runtime;
pub mod scheduler;

// Re-exports for convenience
pub use config::{CogsimConfig, ConfigError, ConfigLoader};
pub use connector::{AgentConnector, Authority, ConnectorError, CredentialStore, Endpoint, LocalClock, Participant};
pub use controller::{CompletionReport, Controller, ControllerError, ModelOutcome};
pub use harness::{ExecutionTester, ExperimentAdapter, ExperimentListener, HarnessError};
pub use lock::{LockError, LockStep, UnlockStep, VariableContext};
pub use model::{Model, ModelDefinition, ModelEvent, ModelStatus};
pub use runtime::Runtime;
pub use scheduler::{Scheduler, SchedulerError, ScoringFunction};

pub use cogsim_types::{ErrorCode, ModelId, ParticipantId, SessionId};
