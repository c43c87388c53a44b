//! Experiment harness helpers.
//!
//! An [`ExperimentListener`] receives the two callbacks experiments care
//! about. [`ExperimentAdapter`] turns one into a dispatcher listener:
//!
//! ```
//! use cogsim_runtime::harness::{ExecutionTester, ExperimentAdapter};
//! # use cogsim_runtime::model::{Condition, ModelBuilder, Production};
//! # let model = ModelBuilder::new("m").buffer("goal")
//! #     .production(Production::new("p").when(Condition::full("goal"))).load().unwrap();
//!
//! let tester = ExperimentAdapter::attach(ExecutionTester::new().expect(["p"]), &model);
//! // ... run the model ...
//! # let _ = tester;
//! ```

use crate::model::{Instantiation, Model, ModelEvent, ModelStatus};
use cogsim_event::Listener;
use cogsim_types::{ErrorCode, ModelId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Callbacks for experiment code. Both default to doing nothing.
pub trait ExperimentListener: Send + Sync {
    /// A production fired.
    fn on_instantiation_fired(&self, _model: &ModelId, _instantiation: &Instantiation) {}

    /// A model changed status.
    fn on_model_status_changed(&self, _model: &ModelId, _old: ModelStatus, _new: ModelStatus) {}
}

/// Delivers [`ModelEvent`]s to an [`ExperimentListener`].
#[derive(Debug)]
pub struct ExperimentAdapter<L> {
    listener: L,
}

impl<L: ExperimentListener + 'static> ExperimentAdapter<L> {
    /// Wraps `listener`.
    #[must_use]
    pub fn new(listener: L) -> Self {
        Self { listener }
    }

    /// Wraps `listener` and registers it on `model` for synchronous
    /// delivery. Keep the returned `Arc` to inspect or unregister it.
    pub fn attach(listener: L, model: &Model) -> Arc<Self> {
        let adapter = Arc::new(Self::new(listener));
        model.events().register(Arc::clone(&adapter) as Arc<dyn Listener<ModelEvent>>);
        adapter
    }

    /// The wrapped listener.
    #[must_use]
    pub fn inner(&self) -> &L {
        &self.listener
    }
}

impl<L: ExperimentListener> Listener<ModelEvent> for ExperimentAdapter<L> {
    fn on_event(&self, event: &ModelEvent) {
        match event {
            ModelEvent::InstantiationFired {
                model, instantiation, ..
            } => self.listener.on_instantiation_fired(model, instantiation),
            ModelEvent::StatusChanged { model, old, new, .. } => {
                self.listener.on_model_status_changed(model, *old, *new);
            }
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "experiment-adapter"
    }
}

/// Why a run did not go as the [`ExecutionTester`] expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// An expected production did not fire in order.
    #[error("expected '{expected}' at position {position} of the firing sequence, fired: [{}]", fired.join(", "))]
    MissingFiring {
        expected: String,
        position: usize,
        fired: Vec<String>,
    },

    /// A forbidden production fired.
    #[error("forbidden production '{production}' fired")]
    ForbiddenFired { production: String },

    /// A model ended as `Aborted`.
    #[error("model {model} aborted")]
    ModelAborted { model: ModelId },
}

impl ErrorCode for HarnessError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingFiring { .. } => "HARNESS_MISSING_FIRING",
            Self::ForbiddenFired { .. } => "HARNESS_FORBIDDEN_FIRED",
            Self::ModelAborted { .. } => "HARNESS_MODEL_ABORTED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Checks a run's firings against an expected sequence and a forbidden set.
///
/// The expected productions must fire in the given order; other
/// productions may fire in between. Any firing of a forbidden production,
/// or any model ending `Aborted`, fails verification.
#[derive(Debug, Default)]
pub struct ExecutionTester {
    expected: Vec<String>,
    forbidden: HashSet<String>,
    fired: Mutex<Vec<String>>,
    aborted: Mutex<Vec<ModelId>>,
}

impl ExecutionTester {
    /// Creates a tester expecting nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends productions to the expected sequence.
    #[must_use]
    pub fn expect<I, S>(mut self, productions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected.extend(productions.into_iter().map(Into::into));
        self
    }

    /// Adds productions that must never fire.
    #[must_use]
    pub fn forbid<I, S>(mut self, productions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden.extend(productions.into_iter().map(Into::into));
        self
    }

    /// Production names fired so far, in order.
    #[must_use]
    pub fn fired(&self) -> Vec<String> {
        self.fired.lock().clone()
    }

    /// Checks what was recorded.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: an aborted model, then a
    /// forbidden firing, then a missing expected firing.
    pub fn verify(&self) -> Result<(), HarnessError> {
        if let Some(model) = self.aborted.lock().first() {
            return Err(HarnessError::ModelAborted { model: model.clone() });
        }

        let fired = self.fired();
        if let Some(production) = fired.iter().find(|p| self.forbidden.contains(p.as_str())) {
            return Err(HarnessError::ForbiddenFired {
                production: production.clone(),
            });
        }

        let mut remaining = fired.iter();
        for (position, expected) in self.expected.iter().enumerate() {
            if !remaining.any(|p| p == expected) {
                return Err(HarnessError::MissingFiring {
                    expected: expected.clone(),
                    position,
                    fired,
                });
            }
        }
        Ok(())
    }
}

impl ExperimentListener for ExecutionTester {
    fn on_instantiation_fired(&self, model: &ModelId, instantiation: &Instantiation) {
        debug!(model = %model, production = %instantiation.production_name(), "tester saw firing");
        self.fired.lock().push(instantiation.production_name().to_string());
    }

    fn on_model_status_changed(&self, model: &ModelId, _old: ModelStatus, new: ModelStatus) {
        if new == ModelStatus::Aborted {
            self.aborted.lock().push(model.clone());
        }
    }
}
