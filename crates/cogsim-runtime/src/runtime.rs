//! The explicit runtime value shared by controllers and connectors.

use crate::config::CogsimConfig;
use crate::connector::{
    AgentConnector, Authority, ConnectorError, CredentialStore, Endpoint, LocalClock, LocalHub, Participant,
    ParticipantSpec, RealityConnector,
};
use cogsim_event::{DispatchError, TaskQueue};
use std::sync::Arc;
use tracing::debug;

struct RuntimeInner {
    config: CogsimConfig,
    hub: LocalHub,
    connector: Arc<dyn RealityConnector>,
}

/// Configuration, the in-process endpoint hub and the connector models
/// attach to.
///
/// There is no global instance; pass a `Runtime` to every
/// [`Controller`](crate::controller::Controller) that should share it.
/// Cloning is cheap.
///
/// # Example
///
/// ```
/// use cogsim_runtime::Runtime;
///
/// let runtime = Runtime::default();
/// assert_eq!(runtime.config().scheduler.cycle_time, 0.05);
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("hub", &self.inner.hub)
            .finish_non_exhaustive()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(CogsimConfig::default())
    }
}

impl Runtime {
    /// Creates a runtime whose models run against a [`LocalClock`].
    #[must_use]
    pub fn new(config: CogsimConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                hub: LocalHub::new(),
                connector: Arc::new(LocalClock::new()),
            }),
        }
    }

    /// Returns a runtime sharing this one's config and hub but attaching
    /// models through `connector`.
    #[must_use]
    pub fn with_connector(&self, connector: Arc<dyn RealityConnector>) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config: self.inner.config.clone(),
                hub: self.inner.hub.clone(),
                connector,
            }),
        }
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &CogsimConfig {
        &self.inner.config
    }

    /// Hub resolving `local:` endpoints in this process.
    #[must_use]
    pub fn hub(&self) -> &LocalHub {
        &self.inner.hub
    }

    /// Connector models are attached to on start.
    #[must_use]
    pub fn connector(&self) -> &Arc<dyn RealityConnector> {
        &self.inner.connector
    }

    /// Binds an environment authority.
    ///
    /// # Errors
    ///
    /// See [`Authority::bind`].
    pub async fn bind_authority(
        &self,
        endpoint: &Endpoint,
        credentials: CredentialStore,
    ) -> Result<Authority, ConnectorError> {
        Authority::bind(&self.inner.hub, endpoint, credentials, &self.inner.config.connector).await
    }

    /// Connects a sensor, effector or plain participant.
    ///
    /// # Errors
    ///
    /// See [`Participant::connect`].
    pub async fn connect_participant(
        &self,
        endpoint: &Endpoint,
        spec: ParticipantSpec,
    ) -> Result<Participant, ConnectorError> {
        Participant::connect(&self.inner.hub, endpoint, spec, &self.inner.config.connector).await
    }

    /// Builds a connector attaching models to the authority at `endpoint`.
    #[must_use]
    pub fn agent_connector(&self, endpoint: Endpoint) -> AgentConnector {
        AgentConnector::new(self.inner.hub.clone(), endpoint, self.inner.config.connector.clone())
    }

    /// Starts a task queue sized by `dispatch.queue_capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the worker thread cannot start.
    pub fn task_queue(&self, name: impl Into<String>) -> Result<TaskQueue, DispatchError> {
        let name = name.into();
        debug!(queue = %name, capacity = self.inner.config.dispatch.queue_capacity, "starting task queue");
        TaskQueue::spawn(name, self.inner.config.dispatch.queue_capacity)
    }
}
