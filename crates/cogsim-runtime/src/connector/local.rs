//! Environment-free connector.

use super::envelope::{MotorCommand, Percept};
use super::error::ConnectorError;
use super::inbox::PerceptInbox;
use super::{ModelBridge, RealityConnector};
use async_trait::async_trait;
use cogsim_types::ModelId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Grants every time request at once and drops motor commands.
///
/// Percepts can still be injected with [`deliver`](Self::deliver), which is
/// how tests and scripted experiments feed buffers without an authority.
#[derive(Debug, Default)]
pub struct LocalClock {
    bridges: Mutex<HashMap<ModelId, Arc<LocalBridge>>>,
}

impl LocalClock {
    /// Creates a clock with no connected models.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a percept for `model` at `timestamp`.
    ///
    /// Percepts for a model that is not connected yet are kept until it
    /// connects.
    pub fn deliver(&self, model: &ModelId, timestamp: f64, percept: Percept) {
        let bridge = Arc::clone(
            self.bridges
                .lock()
                .entry(model.clone())
                .or_insert_with(|| Arc::new(LocalBridge::new(model.clone()))),
        );
        debug!(model = %model, buffer = %percept.buffer, timestamp, "percept delivered");
        bridge.inbox.push(timestamp, percept);
    }

    /// Returns `true` if `model` is connected.
    #[must_use]
    pub fn is_connected(&self, model: &ModelId) -> bool {
        self.bridges.lock().contains_key(model)
    }
}

#[async_trait]
impl RealityConnector for LocalClock {
    async fn connect(&self, model: &ModelId) -> Result<Arc<dyn ModelBridge>, ConnectorError> {
        let bridge = Arc::clone(
            self.bridges
                .lock()
                .entry(model.clone())
                .or_insert_with(|| Arc::new(LocalBridge::new(model.clone()))),
        );
        Ok(bridge)
    }

    async fn disconnect(&self, model: &ModelId) -> Result<(), ConnectorError> {
        self.bridges.lock().remove(model);
        Ok(())
    }
}

#[derive(Debug)]
struct LocalBridge {
    model: ModelId,
    inbox: PerceptInbox,
}

impl LocalBridge {
    fn new(model: ModelId) -> Self {
        Self {
            model,
            inbox: PerceptInbox::new(),
        }
    }
}

#[async_trait]
impl ModelBridge for LocalBridge {
    async fn wait_for_time(&self, until: f64) -> Result<f64, ConnectorError> {
        Ok(until)
    }

    async fn idle(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn submit_motor(&self, command: MotorCommand) -> Result<(), ConnectorError> {
        info!(
            model = %self.model,
            buffer = %command.buffer,
            command = %command.command,
            "no environment; motor command dropped"
        );
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chunk;

    #[tokio::test]
    async fn time_is_always_granted() {
        let clock = LocalClock::new();
        let bridge = clock.connect(&ModelId::named("m")).await.unwrap();
        assert_eq!(bridge.wait_for_time(42.0).await.unwrap(), 42.0);
        assert!(bridge.idle().await.is_ok());
    }

    #[tokio::test]
    async fn early_percepts_wait_for_connect() {
        let clock = LocalClock::new();
        let id = ModelId::named("m");
        clock.deliver(&id, 0.5, Percept::new("visual", Chunk::new("loc", "loc")));

        let bridge = clock.connect(&id).await.unwrap();
        assert_eq!(bridge.next_percept_time(), Some(0.5));
        assert!(bridge.take_percepts(0.4).is_empty());
        assert_eq!(bridge.take_percepts(0.5).len(), 1);
    }

    #[tokio::test]
    async fn disconnect_forgets_model() {
        let clock = LocalClock::new();
        let id = ModelId::named("m");
        clock.connect(&id).await.unwrap();
        assert!(clock.is_connected(&id));
        clock.disconnect(&id).await.unwrap();
        assert!(!clock.is_connected(&id));
    }
}
