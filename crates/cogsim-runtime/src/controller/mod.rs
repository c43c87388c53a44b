//! Runtime controller: starts, stops and awaits a set of models.
//!
//! ```text
//! add_model ──► CompletionTracker registered on the model's dispatcher
//!
//! start ─┬─ connect every new model to the runtime's connector
//!        ├─ spawn one cycle task per model
//!        └─ await each "running" acknowledgement
//!
//! stop ──► stop flag on every model ──► await terminal statuses
//!
//! wait_for_completion ──► CompletionHandle ──► CompletionReport
//! ```
//!
//! The controller never waits for a model to finish in `start`. A model
//! that fails ends as `Aborted` without touching the others.
//!
//! # Example
//!
//! ```no_run
//! use cogsim_runtime::controller::{Controller, ModelOutcome};
//! use cogsim_runtime::model::{Action, ChunkTemplate, Condition, ModelBuilder, Production};
//! use cogsim_runtime::Runtime;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let model = ModelBuilder::new("hello")
//!     .chunk_type("start", &[])
//!     .buffer("goal")
//!     .production(
//!         Production::new("begin")
//!             .when(Condition::empty("goal"))
//!             .then(Action::set("goal", ChunkTemplate::of_type("start")))
//!             .then(Action::Stop),
//!     )
//!     .load()?;
//!
//! let controller = Controller::new(&Runtime::default());
//! let id = controller.add_model(model)?;
//! controller.start().await?;
//! let report = controller.wait_for_completion().await;
//! assert_eq!(report.outcome(&id), Some(&ModelOutcome::Completed));
//! # Ok(())
//! # }
//! ```

mod completion;
mod error;

pub use completion::{CompletionHandle, CompletionReport, ModelOutcome, ModelReport};
pub use error::ControllerError;

use crate::connector::RealityConnector;
use crate::model::{Model, ModelEvent, ModelStatus};
use crate::runtime::Runtime;
use crate::scheduler::Scheduler;
use cogsim_event::{EventDispatcher, Listener};
use cogsim_types::ModelId;
use completion::CompletionTracker;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Controller-level notifications.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// A model came under management.
    ModelAdded { model: ModelId },
    /// A model left management.
    ModelRemoved { model: ModelId },
    /// A model's cycle task acknowledged it is running.
    ModelStarted { model: ModelId },
    /// A managed model reached a terminal status.
    ModelFinished { model: ModelId, outcome: ModelOutcome },
    /// `stop()` was called.
    StopRequested,
}

struct Managed {
    model: Model,
    task: Option<JoinHandle<()>>,
}

impl Managed {
    /// Running, or spawned and not yet terminal.
    fn is_busy(&self) -> bool {
        let status = self.model.status();
        status.is_active() || (!status.is_terminal() && self.task.as_ref().is_some_and(|t| !t.is_finished()))
    }
}

/// Starts, stops and awaits a set of models on one [`Runtime`].
pub struct Controller {
    runtime: Runtime,
    models: Mutex<Vec<Managed>>,
    tracker: Arc<CompletionTracker>,
    events: Arc<EventDispatcher<ControllerEvent>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let models: Vec<ModelId> = self.models.lock().iter().map(|m| m.model.id().clone()).collect();
        f.debug_struct("Controller")
            .field("models", &models)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a controller without models.
    #[must_use]
    pub fn new(runtime: &Runtime) -> Self {
        let events = Arc::new(EventDispatcher::new("controller"));
        Self {
            runtime: runtime.clone(),
            models: Mutex::new(Vec::new()),
            tracker: Arc::new(CompletionTracker::new(Arc::clone(&events))),
            events,
        }
    }

    /// The runtime models are attached through.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Controller-level event dispatcher.
    #[must_use]
    pub fn events(&self) -> &Arc<EventDispatcher<ControllerEvent>> {
        &self.events
    }

    /// Managed models, in the order they were added.
    #[must_use]
    pub fn models(&self) -> Vec<Model> {
        self.models.lock().iter().map(|m| m.model.clone()).collect()
    }

    /// A managed model by id.
    #[must_use]
    pub fn model(&self, id: &ModelId) -> Option<Model> {
        self.models
            .lock()
            .iter()
            .find(|m| m.model.id() == id)
            .map(|m| m.model.clone())
    }

    /// Puts `model` under management. It runs on the next [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::DuplicateModel`] if the model is already
    /// managed.
    pub fn add_model(&self, model: Model) -> Result<ModelId, ControllerError> {
        let id = model.id().clone();
        {
            let mut models = self.models.lock();
            if models.iter().any(|m| m.model.id() == &id) {
                return Err(ControllerError::DuplicateModel { model: id });
            }
            model.events().register(self.tracker_listener());
            models.push(Managed {
                model: model.clone(),
                task: None,
            });
        }
        self.tracker.observe(&model);

        info!(model = %id, "model added");
        self.events.publish(ControllerEvent::ModelAdded { model: id.clone() });
        Ok(id)
    }

    /// Takes a model out of management and detaches it from the connector.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::UnknownModel`] if the model is not managed
    /// - [`ControllerError::ModelRunning`] if the model has not reached a
    ///   terminal status
    /// - [`ControllerError::Connector`] if detaching fails; the model is
    ///   removed regardless
    pub async fn remove_model(&self, id: &ModelId) -> Result<Model, ControllerError> {
        let managed = {
            let mut models = self.models.lock();
            let index = models
                .iter()
                .position(|m| m.model.id() == id)
                .ok_or_else(|| ControllerError::UnknownModel { model: id.clone() })?;
            if models[index].is_busy() {
                return Err(ControllerError::ModelRunning { model: id.clone() });
            }
            models.remove(index)
        };

        if let Some(task) = managed.task {
            if let Err(e) = task.await {
                error!(model = %id, error = %e, "supervisor task failed");
            }
        }
        let model = managed.model;
        model.events().unregister(&self.tracker);
        self.tracker.forget(id);

        info!(model = %id, "model removed");
        self.events.publish(ControllerEvent::ModelRemoved { model: id.clone() });
        self.runtime.connector().disconnect(id).await?;
        Ok(model)
    }

    /// Starts every managed model that has not run yet.
    ///
    /// Connects them all first, then spawns one cycle task each and waits
    /// until every task reports its model running. Returns the ids started.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Connector`] if a model cannot be attached;
    /// nothing is started in that case.
    pub async fn start(&self) -> Result<Vec<ModelId>, ControllerError> {
        let pending: Vec<Model> = self
            .models
            .lock()
            .iter()
            .filter(|m| m.task.is_none() && m.model.status() == ModelStatus::Ready)
            .map(|m| m.model.clone())
            .collect();
        if pending.is_empty() {
            debug!("nothing to start");
            return Ok(Vec::new());
        }

        let connector = Arc::clone(self.runtime.connector());
        let mut bridges = Vec::with_capacity(pending.len());
        for model in &pending {
            match connector.connect(model.id()).await {
                Ok(bridge) => bridges.push(bridge),
                Err(e) => {
                    warn!(model = %model.id(), error = %e, "connect failed; start cancelled");
                    for attached in pending.iter().take(bridges.len()) {
                        if let Err(e) = connector.disconnect(attached.id()).await {
                            debug!(model = %attached.id(), error = %e, "disconnect after failed start");
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        let config = &self.runtime.config().scheduler;
        let mut acks = Vec::with_capacity(pending.len());
        for (model, bridge) in pending.into_iter().zip(bridges) {
            let scheduler = Scheduler::new(model.clone(), bridge, config);
            let (ack_tx, ack_rx) = oneshot::channel();
            let task = tokio::spawn(supervise(model.clone(), scheduler, ack_tx, Arc::clone(&connector)));

            if let Some(managed) = self.models.lock().iter_mut().find(|m| m.model.id() == model.id()) {
                managed.task = Some(task);
            }
            acks.push((model, ack_rx));
        }

        let mut started = Vec::with_capacity(acks.len());
        for (model, ack) in acks {
            if ack.await.is_ok() {
                self.events.publish(ControllerEvent::ModelStarted {
                    model: model.id().clone(),
                });
                started.push(model.id().clone());
            } else {
                debug!(model = %model.id(), status = %model.status(), "model ended before running");
            }
        }
        info!(count = started.len(), "models started");
        Ok(started)
    }

    /// Requests every managed model to stop and waits until all are terminal.
    ///
    /// Models that never started end as `Stopped` at once; running ones stop
    /// at their next cycle boundary or suspended wait.
    pub async fn stop(&self) -> CompletionReport {
        info!("stopping all models");
        self.events.publish(ControllerEvent::StopRequested);

        let models = self.models();
        for model in &models {
            model.request_stop();
        }
        let report = self.wait_for_completion().await;

        let tasks: Vec<JoinHandle<()>> = self
            .models
            .lock()
            .iter_mut()
            .filter_map(|m| m.task.take())
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "supervisor task failed");
            }
        }
        report
    }

    /// Returns a handle resolving once every currently managed model is
    /// terminal.
    #[must_use]
    pub fn wait_for_completion(&self) -> CompletionHandle {
        self.tracker.handle(self.models())
    }

    fn tracker_listener(&self) -> Arc<dyn Listener<ModelEvent>> {
        Arc::clone(&self.tracker) as Arc<dyn Listener<ModelEvent>>
    }
}

/// Runs one model and cleans up after it.
///
/// A panicking cycle loop aborts the model; either way the model is
/// detached so it no longer holds a shared clock back.
async fn supervise(
    model: Model,
    scheduler: Scheduler,
    ack: oneshot::Sender<()>,
    connector: Arc<dyn RealityConnector>,
) {
    match tokio::spawn(scheduler.run_with_ack(ack)).await {
        Ok(Ok(outcome)) => {
            debug!(model = %model.id(), status = %outcome.status, cycles = outcome.cycles, time = outcome.time, "run ended");
        }
        Ok(Err(e)) => {
            debug!(model = %model.id(), error = %e, "run did not start");
        }
        Err(e) => {
            error!(model = %model.id(), error = %e, "cycle task failed");
            model.transition(|_| true, ModelStatus::Aborted, Some(format!("cycle task failed: {e}")));
        }
    }
    if let Err(e) = connector.disconnect(model.id()).await {
        warn!(model = %model.id(), error = %e, "disconnect after run failed");
    }
}
