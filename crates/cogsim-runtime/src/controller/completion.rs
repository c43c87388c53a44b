//! Completion tracking: terminal status events in, one report out.

use super::ControllerEvent;
use crate::model::{Model, ModelEvent, ModelStatus};
use cogsim_event::{EventDispatcher, Listener};
use cogsim_types::ModelId;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// How a model finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    /// Ended normally.
    Completed,
    /// Ended by an unrecoverable error.
    Aborted { reason: String },
    /// Ended by a stop request.
    Stopped,
}

impl ModelOutcome {
    /// Outcome for a terminal status; `None` for any other.
    #[must_use]
    pub fn from_status(status: ModelStatus, reason: Option<String>) -> Option<Self> {
        match status {
            ModelStatus::Completed => Some(Self::Completed),
            ModelStatus::Aborted => Some(Self::Aborted {
                reason: reason.unwrap_or_else(|| "unknown".to_string()),
            }),
            ModelStatus::Stopped => Some(Self::Stopped),
            _ => None,
        }
    }

    /// The terminal status this outcome corresponds to.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        match self {
            Self::Completed => ModelStatus::Completed,
            Self::Aborted { .. } => ModelStatus::Aborted,
            Self::Stopped => ModelStatus::Stopped,
        }
    }
}

impl fmt::Display for ModelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// One model's entry in a [`CompletionReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    /// The model.
    pub model: ModelId,
    /// How it finished.
    #[serde(flatten)]
    pub outcome: ModelOutcome,
    /// Cycles run.
    pub cycles: u64,
    /// Final simulated time.
    pub time: f64,
}

/// Per-model outcomes, in the order the models were added.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CompletionReport {
    /// Entries in model order.
    pub models: Vec<ModelReport>,
}

impl CompletionReport {
    /// Outcome of `model`.
    #[must_use]
    pub fn outcome(&self, model: &ModelId) -> Option<&ModelOutcome> {
        self.models.iter().find(|r| &r.model == model).map(|r| &r.outcome)
    }

    /// Entry of the first model named `name`.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&ModelReport> {
        self.models.iter().find(|r| r.model.name == name)
    }

    /// Returns `true` if every model completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.models.iter().all(|r| r.outcome == ModelOutcome::Completed)
    }

    /// Number of models reported.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns `true` if no model was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

type Outcomes = HashMap<ModelId, ModelOutcome>;

/// Records terminal `StatusChanged` events of every managed model.
///
/// One tracker is shared by all models of a controller; waiters observe it
/// through a `watch` channel.
pub(crate) struct CompletionTracker {
    outcomes: watch::Sender<Outcomes>,
    events: Arc<EventDispatcher<ControllerEvent>>,
}

impl CompletionTracker {
    pub(crate) fn new(events: Arc<EventDispatcher<ControllerEvent>>) -> Self {
        let (outcomes, _) = watch::channel(Outcomes::new());
        Self { outcomes, events }
    }

    /// Records the outcome of a model that is already terminal.
    pub(crate) fn observe(&self, model: &Model) {
        if let Some(outcome) = ModelOutcome::from_status(model.status(), model.abort_reason()) {
            self.record(model.id(), outcome);
        }
    }

    pub(crate) fn record(&self, model: &ModelId, outcome: ModelOutcome) {
        let fresh = self.outcomes.send_if_modified(|outcomes| {
            if outcomes.contains_key(model) {
                return false;
            }
            outcomes.insert(model.clone(), outcome.clone());
            true
        });
        if fresh {
            debug!(model = %model, outcome = %outcome, "completion recorded");
            self.events.publish(ControllerEvent::ModelFinished {
                model: model.clone(),
                outcome,
            });
        }
    }

    pub(crate) fn forget(&self, model: &ModelId) {
        self.outcomes.send_if_modified(|outcomes| outcomes.remove(model).is_some());
    }

    pub(crate) fn handle(&self, models: Vec<Model>) -> CompletionHandle {
        CompletionHandle {
            outcomes: self.outcomes.subscribe(),
            models,
        }
    }
}

impl Listener<ModelEvent> for CompletionTracker {
    fn on_event(&self, event: &ModelEvent) {
        if let ModelEvent::StatusChanged {
            model, new, reason, ..
        } = event
        {
            if let Some(outcome) = ModelOutcome::from_status(*new, reason.clone()) {
                self.record(model, outcome);
            }
        }
    }

    fn name(&self) -> &str {
        "completion-tracker"
    }
}

/// Resolves once every model it covers is terminal.
///
/// Covers the models managed when it was created. Await it directly or via
/// [`wait`](Self::wait):
///
/// ```no_run
/// # async fn demo(controller: &cogsim_runtime::controller::Controller) {
/// let report = controller.wait_for_completion().await;
/// println!("{}", report.all_completed());
/// # }
/// ```
pub struct CompletionHandle {
    outcomes: watch::Receiver<Outcomes>,
    models: Vec<Model>,
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("models", &self.models.len())
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl CompletionHandle {
    /// Returns `true` if every covered model is terminal.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let outcomes = self.outcomes.borrow();
        self.models.iter().all(|m| outcomes.contains_key(m.id()))
    }

    /// Waits for every covered model to finish.
    pub async fn wait(mut self) -> CompletionReport {
        while !self.is_complete() {
            if self.outcomes.changed().await.is_err() {
                break;
            }
        }
        self.report()
    }

    fn report(&self) -> CompletionReport {
        let outcomes = self.outcomes.borrow();
        let models = self
            .models
            .iter()
            .map(|model| {
                let outcome = outcomes
                    .get(model.id())
                    .cloned()
                    .or_else(|| ModelOutcome::from_status(model.status(), model.abort_reason()))
                    .unwrap_or(ModelOutcome::Stopped);
                ModelReport {
                    model: model.id().clone(),
                    outcome,
                    cycles: model.cycles(),
                    time: model.time(),
                }
            })
            .collect();
        CompletionReport { models }
    }
}

impl IntoFuture for CompletionHandle {
    type Output = CompletionReport;
    type IntoFuture = Pin<Box<dyn Future<Output = CompletionReport> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
