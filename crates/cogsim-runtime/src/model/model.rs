//! A loaded, runnable model instance.

use super::buffer::{BufferSet, BufferState};
use super::chunk::ChunkType;
use super::definition::ModelDefinition;
use super::error::ModelDefinitionError;
use super::event::{CyclePhase, ModelEvent, ModelStatus};
use super::production::Production;
use crate::scheduler::{ConstantScore, NoPendingRequests, RunLimits, ScoringFunction, TerminationPredicate};
use cogsim_event::EventDispatcher;
use cogsim_types::ModelId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Cooperative control flags read by the cycle loop at cycle boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Control {
    pub stop: bool,
    pub pause: bool,
}

#[derive(Debug)]
struct StatusCell {
    status: ModelStatus,
    reason: Option<String>,
}

struct ModelInner {
    id: ModelId,
    definition: ModelDefinition,
    productions: Vec<Arc<Production>>,
    chunk_types: HashMap<String, ChunkType>,
    buffers: BufferSet,
    events: Arc<EventDispatcher<ModelEvent>>,
    status: Mutex<StatusCell>,
    clock: Mutex<f64>,
    phase: Mutex<CyclePhase>,
    cycles: AtomicU64,
    chunk_seq: AtomicU64,
    running: AtomicBool,
    control: watch::Sender<Control>,
    scoring: RwLock<Arc<dyn ScoringFunction>>,
    termination: RwLock<Arc<dyn TerminationPredicate>>,
    limits: RwLock<Option<RunLimits>>,
}

/// Shared handle to a model instance.
///
/// Cloning is cheap; all clones refer to the same buffers, clock and
/// status. The model owns its buffers and productions; productions refer to
/// buffers by name only.
///
/// # Example
///
/// ```
/// use cogsim_runtime::model::{Action, ChunkTemplate, Condition, ModelBuilder, ModelStatus};
///
/// let model = ModelBuilder::new("hello")
///     .chunk_type("start", &[])
///     .buffer("goal")
///     .production(
///         cogsim_runtime::model::Production::new("begin")
///             .when(Condition::empty("goal"))
///             .then(Action::set("goal", ChunkTemplate::of_type("start"))),
///     )
///     .load()
///     .unwrap();
///
/// assert_eq!(model.status(), ModelStatus::Ready);
/// assert_eq!(model.time(), 0.0);
/// ```
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .field("time", &self.time())
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Validates `definition` and builds a ready model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelDefinitionError`] if the definition is malformed; no
    /// model is created in that case.
    pub fn load(definition: ModelDefinition) -> Result<Self, ModelDefinitionError> {
        definition.validate()?;

        let id = ModelId::new(definition.name.clone());
        let events = Arc::new(EventDispatcher::new(format!("model:{}", definition.name)));
        let buffers = BufferSet::new(id.clone(), &definition.buffers, Arc::clone(&events));

        let named: HashMap<&str, _> = definition.chunks.iter().map(|c| (c.name(), c)).collect();
        for (buffer, chunk) in &definition.initial {
            if let Some(chunk) = named.get(chunk.as_str()) {
                buffers.set(buffer, Some(Arc::new((*chunk).clone())), BufferState::Free);
            }
        }

        let productions = definition
            .productions
            .iter()
            .cloned()
            .map(Arc::new)
            .collect();
        let chunk_types = definition
            .chunk_types
            .iter()
            .map(|t| (t.name.clone(), t.clone()))
            .collect();
        let (control, _) = watch::channel(Control::default());

        let model = Self {
            inner: Arc::new(ModelInner {
                id,
                definition,
                productions,
                chunk_types,
                buffers,
                events,
                status: Mutex::new(StatusCell {
                    status: ModelStatus::Unloaded,
                    reason: None,
                }),
                clock: Mutex::new(0.0),
                phase: Mutex::new(CyclePhase::Ready),
                cycles: AtomicU64::new(0),
                chunk_seq: AtomicU64::new(0),
                running: AtomicBool::new(false),
                control,
                scoring: RwLock::new(Arc::new(ConstantScore::default())),
                termination: RwLock::new(Arc::new(NoPendingRequests)),
                limits: RwLock::new(None),
            }),
        };
        model.transition(|s| s == ModelStatus::Unloaded, ModelStatus::Ready, None);
        debug!(model = %model.id(), "model loaded");
        Ok(model)
    }

    /// Parses and loads a JSON definition.
    ///
    /// # Errors
    ///
    /// Returns [`ModelDefinitionError`] on parse or validation failure.
    pub fn from_json(json: &str) -> Result<Self, ModelDefinitionError> {
        Self::load(ModelDefinition::from_json(json)?)
    }

    /// Instance identity.
    #[must_use]
    pub fn id(&self) -> &ModelId {
        &self.inner.id
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.id.name
    }

    /// The definition this model was loaded from.
    #[must_use]
    pub fn definition(&self) -> &ModelDefinition {
        &self.inner.definition
    }

    /// Productions in declaration order.
    #[must_use]
    pub fn productions(&self) -> &[Arc<Production>] {
        &self.inner.productions
    }

    /// Declared chunk type by name.
    #[must_use]
    pub fn chunk_type(&self, name: &str) -> Option<&ChunkType> {
        self.inner.chunk_types.get(name)
    }

    /// The model's buffers.
    #[must_use]
    pub fn buffers(&self) -> &BufferSet {
        &self.inner.buffers
    }

    /// The model's event dispatcher.
    #[must_use]
    pub fn events(&self) -> &Arc<EventDispatcher<ModelEvent>> {
        &self.inner.events
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        self.inner.status.lock().status
    }

    /// Why the model aborted, if it did.
    #[must_use]
    pub fn abort_reason(&self) -> Option<String> {
        self.inner.status.lock().reason.clone()
    }

    /// Simulated time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        *self.inner.clock.lock()
    }

    /// Phase of the current cycle.
    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        *self.inner.phase.lock()
    }

    /// Completed cycles.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::Acquire)
    }

    /// Replaces the conflict-resolution scoring function.
    pub fn set_scoring(&self, scoring: Arc<dyn ScoringFunction>) {
        *self.inner.scoring.write() = scoring;
    }

    /// Replaces the termination predicate.
    pub fn set_termination(&self, termination: Arc<dyn TerminationPredicate>) {
        *self.inner.termination.write() = termination;
    }

    /// Overrides the runtime-wide run limits for this model.
    pub fn set_limits(&self, limits: RunLimits) {
        *self.inner.limits.write() = Some(limits);
    }

    /// Asks the cycle loop to stop at the next cycle boundary.
    ///
    /// A model that was never started becomes `Stopped` immediately.
    pub fn request_stop(&self) {
        self.inner.control.send_modify(|c| c.stop = true);
        if !self.inner.running.load(Ordering::Acquire) {
            self.transition(|s| s == ModelStatus::Ready, ModelStatus::Stopped, None);
        }
    }

    /// Asks the cycle loop to pause at the next cycle boundary.
    pub fn pause(&self) {
        self.inner.control.send_modify(|c| c.pause = true);
    }

    /// Lifts a pause.
    pub fn resume(&self) {
        self.inner.control.send_modify(|c| c.pause = false);
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.inner.control.borrow().stop
    }

    pub(crate) fn control(&self) -> watch::Receiver<Control> {
        self.inner.control.subscribe()
    }

    pub(crate) fn scoring(&self) -> Arc<dyn ScoringFunction> {
        Arc::clone(&self.inner.scoring.read())
    }

    pub(crate) fn termination(&self) -> Arc<dyn TerminationPredicate> {
        Arc::clone(&self.inner.termination.read())
    }

    pub(crate) fn limits(&self) -> Option<RunLimits> {
        *self.inner.limits.read()
    }

    /// Takes the run guard. Returns `false` if another driver holds it.
    pub(crate) fn try_begin_run(&self) -> bool {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_run(&self) {
        self.inner.running.store(false, Ordering::Release);
    }

    pub(crate) fn set_phase(&self, phase: CyclePhase) {
        *self.inner.phase.lock() = phase;
    }

    /// Commits the clock. Never moves backwards.
    pub(crate) fn commit_time(&self, time: f64) {
        let mut clock = self.inner.clock.lock();
        if time > *clock {
            *clock = time;
        }
    }

    pub(crate) fn finish_cycle(&self) -> u64 {
        self.inner.cycles.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn next_chunk_name(&self, chunk_type: &str) -> String {
        let n = self.inner.chunk_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{chunk_type}-{n}")
    }

    /// Moves to `to` if the current status satisfies `from`, then publishes
    /// `StatusChanged`. Terminal statuses never change.
    ///
    /// Returns the previous status on success.
    pub(crate) fn transition(
        &self,
        from: impl Fn(ModelStatus) -> bool,
        to: ModelStatus,
        reason: Option<String>,
    ) -> Option<ModelStatus> {
        let old = {
            let mut cell = self.inner.status.lock();
            if cell.status.is_terminal() || cell.status == to || !from(cell.status) {
                return None;
            }
            let old = cell.status;
            cell.status = to;
            if reason.is_some() {
                cell.reason.clone_from(&reason);
            }
            old
        };

        if to.is_terminal() {
            info!(model = %self.id(), from = %old, to = %to, reason = ?reason, "model finished");
        } else {
            debug!(model = %self.id(), from = %old, to = %to, "model status changed");
        }
        self.inner.events.publish(ModelEvent::StatusChanged {
            model: self.id().clone(),
            old,
            new: to,
            reason,
        });
        Some(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Chunk, ChunkTemplate, Condition, ModelBuilder, Value};
    use cogsim_event::listener_fn;

    fn simple() -> Model {
        ModelBuilder::new("simple")
            .chunk_type("goal", &["state"])
            .buffer("goal")
            .chunk(Chunk::new("g0", "goal").with_slot("state", Value::symbol("go")))
            .initial("goal", "g0")
            .production(
                Production::new("p")
                    .when(Condition::full("goal"))
                    .then(Action::set("goal", ChunkTemplate::of_type("goal"))),
            )
            .load()
            .unwrap()
    }

    #[test]
    fn load_places_initial_chunks() {
        let model = simple();
        let chunk = model.buffers().chunk("goal").unwrap();
        assert_eq!(chunk.name(), "g0");
        assert_eq!(chunk.get("state"), &Value::symbol("go"));
        assert_eq!(model.status(), ModelStatus::Ready);
        assert!(model.chunk_type("goal").is_some());
    }

    #[test]
    fn stop_before_start_marks_stopped() {
        let model = simple();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        model.events().register(listener_fn("status", move |e: &ModelEvent| {
            if let ModelEvent::StatusChanged { old, new, .. } = e {
                s.lock().push((*old, *new));
            }
        }));

        model.request_stop();
        assert_eq!(model.status(), ModelStatus::Stopped);
        assert!(model.stop_requested());
        assert_eq!(
            *seen.lock(),
            vec![(ModelStatus::Ready, ModelStatus::Stopped)]
        );
    }

    #[test]
    fn terminal_status_is_final() {
        let model = simple();
        model.transition(|_| true, ModelStatus::Aborted, Some("boom".into()));
        assert!(model
            .transition(|_| true, ModelStatus::Running, None)
            .is_none());
        assert_eq!(model.status(), ModelStatus::Aborted);
        assert_eq!(model.abort_reason().as_deref(), Some("boom"));
    }

    #[test]
    fn clock_is_monotonic() {
        let model = simple();
        model.commit_time(1.0);
        model.commit_time(0.5);
        assert!((model.time() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn run_guard_is_exclusive() {
        let model = simple();
        assert!(model.try_begin_run());
        assert!(!model.clone().try_begin_run());
        model.end_run();
        assert!(model.try_begin_run());
    }

    #[test]
    fn generated_chunk_names_are_unique() {
        let model = simple();
        assert_eq!(model.next_chunk_name("goal"), "goal-1");
        assert_eq!(model.next_chunk_name("goal"), "goal-2");
    }
}
