//! One clocked agent participant per model.

use super::envelope::{Credentials, MotorCommand, Percept, Role};
use super::error::ConnectorError;
use super::inbox::PerceptInbox;
use super::participant::{Participant, ParticipantSpec};
use super::transport::{Endpoint, LocalHub};
use super::{ConnectorEvent, ModelBridge, RealityConnector};
use crate::config::ConnectorConfig;
use async_trait::async_trait;
use cogsim_event::{listener_fn, Listener};
use cogsim_types::ModelId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Connects each model to an [`Authority`](super::Authority) as a clocked
/// [`Role::Agent`].
///
/// By default the agent's identity is the model's name with an empty
/// secret. [`with_secret`](Self::with_secret) keeps the model-name identity
/// with a shared secret; [`with_credentials`](Self::with_credentials) makes
/// every agent present the same credentials.
#[derive(Debug)]
pub struct AgentConnector {
    hub: LocalHub,
    endpoint: Endpoint,
    config: ConnectorConfig,
    identity: Option<String>,
    secret: String,
    agents: Mutex<HashMap<ModelId, Arc<AgentBridge>>>,
}

impl AgentConnector {
    /// Creates a connector for the authority at `endpoint`.
    #[must_use]
    pub fn new(hub: LocalHub, endpoint: Endpoint, config: ConnectorConfig) -> Self {
        Self {
            hub,
            endpoint,
            config,
            identity: None,
            secret: String::new(),
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Uses `secret` with the model-name identity.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Uses the same credentials for every model.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.identity = Some(credentials.identity);
        self.secret = credentials.secret;
        self
    }

    /// Endpoint of the authority.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The agent participant of a connected model.
    #[must_use]
    pub fn participant(&self, model: &ModelId) -> Option<Arc<Participant>> {
        self.agents
            .lock()
            .get(model)
            .map(|bridge| Arc::clone(&bridge.participant))
    }
}

#[async_trait]
impl RealityConnector for AgentConnector {
    async fn connect(&self, model: &ModelId) -> Result<Arc<dyn ModelBridge>, ConnectorError> {
        let existing = self.agents.lock().get(model).cloned();
        if let Some(bridge) = existing {
            return Ok(bridge);
        }

        let identity = self.identity.clone().unwrap_or_else(|| model.name.clone());
        let spec = ParticipantSpec::new(Role::Agent, Credentials::new(identity.clone(), self.secret.clone())).clocked();
        let participant = Participant::connect(&self.hub, &self.endpoint, spec, &self.config).await?;

        let bridge = Arc::new(AgentBridge {
            participant: Arc::new(participant),
            inbox: Arc::new(PerceptInbox::new()),
            identity,
        });
        bridge.participant.events().register(bridge.feed());
        debug!(model = %model, endpoint = %self.endpoint, "agent connected");

        self.agents.lock().insert(model.clone(), Arc::clone(&bridge));
        Ok(bridge)
    }

    async fn disconnect(&self, model: &ModelId) -> Result<(), ConnectorError> {
        let bridge = self.agents.lock().remove(model);
        match bridge {
            Some(bridge) => bridge.participant.disconnect().await,
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct AgentBridge {
    participant: Arc<Participant>,
    inbox: Arc<PerceptInbox>,
    identity: String,
}

impl AgentBridge {
    /// Listener moving incoming percepts into the inbox.
    fn feed(&self) -> Arc<dyn Listener<ConnectorEvent>> {
        let inbox = Arc::clone(&self.inbox);
        listener_fn("agent-inbox", move |event: &ConnectorEvent| match event {
            ConnectorEvent::PerceptReceived { percept, timestamp } => {
                inbox.push(*timestamp, percept.clone());
            }
            ConnectorEvent::Disconnected { .. } => inbox.wake(),
            _ => {}
        })
    }
}

#[async_trait]
impl ModelBridge for AgentBridge {
    async fn wait_for_time(&self, until: f64) -> Result<f64, ConnectorError> {
        self.participant.request_time(until).await
    }

    async fn idle(&self) -> Result<(), ConnectorError> {
        self.participant.idle().await
    }

    async fn submit_motor(&self, mut command: MotorCommand) -> Result<(), ConnectorError> {
        command.source.clone_from(&self.identity);
        self.participant.send_motor(command).await
    }

    fn take_percepts(&self, up_to: f64) -> Vec<(f64, Percept)> {
        self.inbox.take(up_to)
    }

    fn next_percept_time(&self) -> Option<f64> {
        self.inbox.next_time()
    }

    fn notifier(&self) -> Arc<Notify> {
        self.inbox.notifier()
    }
}
