//! Reality connector: keeps each model's clock in step with its environment.
//!
//! ```text
//!   Model task ──ModelBridge──► AgentConnector ──Participant(Agent)──┐
//!                                                                    ▼
//!   Sensor  ──Participant(Sensor)───► Authority (clock, relay, locks)
//!   Effector ◄─Participant(Effector)──┘
//! ```
//!
//! The scheduler only sees [`ModelBridge`]: a time gate, a motor sink and a
//! percept inbox with a notifier. [`RealityConnector`] hands out one bridge
//! per model:
//!
//! | Connector | Environment |
//! |-----------|-------------|
//! | [`LocalClock`] | none; time is always granted, motor commands are dropped |
//! | [`AgentConnector`] | an [`Authority`] reached over a local or TCP [`Endpoint`] |

mod agent;
mod authority;
mod credentials;
mod envelope;
mod error;
mod inbox;
mod local;
mod participant;
mod transport;

pub use agent::AgentConnector;
pub use authority::Authority;
pub use credentials::CredentialStore;
pub use envelope::{Credentials, Envelope, MotorCommand, Payload, Percept, Role};
pub use error::ConnectorError;
pub use local::LocalClock;
pub use participant::{Participant, ParticipantSpec};
pub use transport::{Endpoint, Link, LocalHub};

use async_trait::async_trait;
use cogsim_types::{ModelId, ParticipantId, SessionId};
use std::sync::Arc;
use tokio::sync::Notify;

/// Notifications published by a [`Participant`].
#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    /// Handshake completed.
    Connected {
        participant: ParticipantId,
        session: SessionId,
    },
    /// A percept arrived (agents).
    PerceptReceived { percept: Percept, timestamp: f64 },
    /// A motor command arrived (effectors).
    MotorReceived { command: MotorCommand, timestamp: f64 },
    /// The authority advanced the clock.
    TimeGranted { until: f64 },
    /// A lock now belongs to this participant.
    LockGranted { name: String },
    /// The link is gone; `None` after an orderly local disconnect.
    Disconnected { reason: Option<String> },
}

/// A model's view of its environment.
#[async_trait]
pub trait ModelBridge: Send + Sync {
    /// Suspends until the environment allows time `until`.
    ///
    /// Returns the granted time (at least `until`).
    async fn wait_for_time(&self, until: f64) -> Result<f64, ConnectorError>;

    /// Tells the environment the model has nothing to do until a percept
    /// arrives.
    async fn idle(&self) -> Result<(), ConnectorError>;

    /// Emits a motor command.
    async fn submit_motor(&self, command: MotorCommand) -> Result<(), ConnectorError>;

    /// Removes every percept stamped at or before `up_to`, oldest first.
    fn take_percepts(&self, up_to: f64) -> Vec<(f64, Percept)>;

    /// Timestamp of the oldest queued percept.
    fn next_percept_time(&self) -> Option<f64>;

    /// Woken whenever a percept is queued or the link drops.
    fn notifier(&self) -> Arc<Notify>;
}

/// Attaches models to an environment.
#[async_trait]
pub trait RealityConnector: Send + Sync {
    /// Connects `model` and returns its bridge.
    async fn connect(&self, model: &ModelId) -> Result<Arc<dyn ModelBridge>, ConnectorError>;

    /// Detaches `model`. Detaching an unknown model is a no-op.
    async fn disconnect(&self, model: &ModelId) -> Result<(), ConnectorError>;
}
