//! The per-model cycle loop.

use super::error::SchedulerError;
use super::firing;
use super::matcher;
use super::policy::{ModelState, RunLimits};
use crate::config::SchedulerConfig;
use crate::connector::{ConnectorError, ModelBridge};
use crate::model::{BufferState, Control, CyclePhase, Model, ModelEvent, ModelStatus};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Terminal status.
    pub status: ModelStatus,
    /// Completed cycles.
    pub cycles: u64,
    /// Final simulated time.
    pub time: f64,
    /// Why the run ended.
    pub reason: Option<String>,
}

enum Ending {
    Completed(String),
    Stopped,
    Aborted(String),
}

enum Wake {
    Percept,
    Stop,
}

/// Releases the run guard when the loop exits, even by panic.
struct RunGuard(Model);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.end_run();
    }
}

/// Drives one model through its cognitive cycles.
///
/// ```text
///  ┌──► control (stop / pause / limits)
///  │    percepts due ─► buffers
///  │    match ─► resolve ─┬─ none ─► idle increment ─► terminate? ─► wait for percept
///  │                      └─ one  ─► fire ─► motor commands
///  └─── wait_for_time(now + action time) ─► commit clock
/// ```
pub struct Scheduler {
    model: Model,
    bridge: Arc<dyn ModelBridge>,
    cycle_time: f64,
    idle_increment: f64,
    limits: RunLimits,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("model", self.model.id())
            .field("cycle_time", &self.cycle_time)
            .field("idle_increment", &self.idle_increment)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler. Limits set on the model take precedence over
    /// the configured ones.
    #[must_use]
    pub fn new(model: Model, bridge: Arc<dyn ModelBridge>, config: &SchedulerConfig) -> Self {
        let limits = model.limits().unwrap_or_else(|| RunLimits::from(config));
        Self {
            model,
            bridge,
            cycle_time: config.cycle_time,
            idle_increment: config.idle_increment,
            limits,
        }
    }

    /// Runs until the model completes, aborts or is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if the loop cannot start. Failures during
    /// the run end it as `Aborted` instead.
    pub async fn run(self) -> Result<RunOutcome, SchedulerError> {
        self.run_inner(None).await
    }

    /// Like [`run`](Self::run), signalling `ack` once the model is `Running`.
    pub(crate) async fn run_with_ack(self, ack: oneshot::Sender<()>) -> Result<RunOutcome, SchedulerError> {
        self.run_inner(Some(ack)).await
    }

    async fn run_inner(self, ack: Option<oneshot::Sender<()>>) -> Result<RunOutcome, SchedulerError> {
        if !self.model.try_begin_run() {
            return Err(SchedulerError::AlreadyRunning {
                model: self.model.name().to_string(),
            });
        }
        let _guard = RunGuard(self.model.clone());

        if self
            .model
            .transition(|s| s == ModelStatus::Ready, ModelStatus::Running, None)
            .is_none()
        {
            return Err(SchedulerError::NotRunnable {
                model: self.model.name().to_string(),
                status: self.model.status(),
            });
        }
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        info!(model = %self.model.id(), limits = ?self.limits, "model running");

        let ending = self.drive().await;
        Ok(self.finish(ending))
    }

    fn finish(&self, ending: Ending) -> RunOutcome {
        let model = &self.model;
        model.set_phase(CyclePhase::Ready);
        let reason = match ending {
            Ending::Completed(reason) => {
                model.transition(|s| s.is_active(), ModelStatus::Completed, None);
                Some(reason)
            }
            Ending::Stopped => {
                model.transition(|_| true, ModelStatus::Stopped, None);
                Some("stop requested".to_string())
            }
            Ending::Aborted(reason) => {
                warn!(model = %model.id(), reason = %reason, "model aborted");
                model.transition(|_| true, ModelStatus::Aborted, Some(reason.clone()));
                Some(reason)
            }
        };
        RunOutcome {
            status: model.status(),
            cycles: model.cycles(),
            time: model.time(),
            reason,
        }
    }

    async fn drive(&self) -> Ending {
        let mut control = self.model.control();

        loop {
            if let Some(ending) = self.at_boundary(&mut control).await {
                return ending;
            }

            let cycle = self.model.cycles() + 1;
            let now = self.model.time();
            self.publish(ModelEvent::CycleStarted {
                model: self.model.id().clone(),
                cycle,
                time: now,
            });

            self.apply_percepts(now);

            self.model.set_phase(CyclePhase::Matching);
            let snapshot = self.model.buffers().snapshot();
            let conflict_set = matcher::conflict_set(self.model.productions(), &snapshot);
            trace!(model = %self.model.id(), cycle, candidates = conflict_set.len(), "matched");
            let state = ModelState {
                model: &self.model,
                time: now,
                cycle,
                buffers: &snapshot,
            };
            self.model.set_phase(CyclePhase::Resolving);
            let scoring = self.model.scoring();
            let selected = matcher::select(conflict_set, scoring.as_ref(), &state);

            let Some(instantiation) = selected else {
                self.model.set_phase(CyclePhase::Ready);
                self.publish(ModelEvent::ConflictSetEmpty {
                    model: self.model.id().clone(),
                    cycle,
                    time: now,
                });
                match self.advance(now + self.idle_increment, &mut control).await {
                    Ok(true) => {}
                    Ok(false) => return Ending::Stopped,
                    Err(e) => return Ending::Aborted(format!("waiting for time: {e}")),
                }
                self.end_cycle();

                let snapshot = self.model.buffers().snapshot();
                let state = ModelState {
                    model: &self.model,
                    time: self.model.time(),
                    cycle,
                    buffers: &snapshot,
                };
                if self.model.termination().should_terminate(&state) {
                    return Ending::Completed("nothing left to do".to_string());
                }
                match self.await_percept(&mut control).await {
                    Ok(Wake::Stop) => return Ending::Stopped,
                    Ok(Wake::Percept) => continue,
                    Err(e) => return Ending::Aborted(format!("waiting for percepts: {e}")),
                }
            };

            debug!(
                model = %self.model.id(),
                cycle,
                time = now,
                production = %instantiation.production_name(),
                score = instantiation.score(),
                "firing"
            );
            self.model.set_phase(CyclePhase::Firing);
            let fired = match firing::fire(&self.model, &instantiation) {
                Ok(fired) => fired,
                Err(e) => return Ending::Aborted(e.to_string()),
            };
            for command in fired.motor {
                let buffer = command.buffer.clone();
                if let Err(e) = self.bridge.submit_motor(command).await {
                    return Ending::Aborted(
                        crate::model::FiringError::MotorRejected {
                            buffer,
                            reason: e.to_string(),
                        }
                        .to_string(),
                    );
                }
            }

            let consumed = instantiation.production().action_time.unwrap_or(self.cycle_time);
            self.publish(ModelEvent::InstantiationFired {
                model: self.model.id().clone(),
                cycle,
                time: now,
                instantiation: Arc::new(instantiation),
                consumed,
            });

            match self.advance(now + consumed, &mut control).await {
                Ok(true) => {}
                Ok(false) => return Ending::Stopped,
                Err(e) => return Ending::Aborted(format!("waiting for time: {e}")),
            }
            self.end_cycle();

            if fired.stop {
                return Ending::Completed("stop action".to_string());
            }
        }
    }

    /// Honors stop, pause and run limits. Returns the ending if the run is over.
    async fn at_boundary(&self, control: &mut watch::Receiver<Control>) -> Option<Ending> {
        // A connector that grants time without suspending would otherwise
        // keep this task on its worker forever.
        tokio::task::yield_now().await;

        let current = *control.borrow_and_update();
        if current.stop {
            return Some(Ending::Stopped);
        }
        if current.pause {
            self.model
                .transition(|s| s == ModelStatus::Running, ModelStatus::Paused, None);
            loop {
                if control.changed().await.is_err() {
                    return Some(Ending::Stopped);
                }
                let current = *control.borrow_and_update();
                if current.stop {
                    return Some(Ending::Stopped);
                }
                if !current.pause {
                    break;
                }
            }
            self.model
                .transition(|s| s == ModelStatus::Paused, ModelStatus::Running, None);
        }

        self.limits
            .reached(self.model.cycles(), self.model.time())
            .map(Ending::Completed)
    }

    /// Waits for the grant of `until` and commits it. Returns `false` if a
    /// stop arrived first.
    async fn advance(&self, until: f64, control: &mut watch::Receiver<Control>) -> Result<bool, ConnectorError> {
        tokio::select! {
            granted = self.bridge.wait_for_time(until) => {
                granted?;
                self.model.commit_time(until);
                Ok(true)
            }
            () = stop_requested(control) => Ok(false),
        }
    }

    fn end_cycle(&self) {
        self.model.set_phase(CyclePhase::Ready);
        let cycle = self.model.finish_cycle();
        self.publish(ModelEvent::CycleFinished {
            model: self.model.id().clone(),
            cycle,
            time: self.model.time(),
        });
    }

    /// Suspends until a percept is queued or a stop arrives.
    async fn await_percept(&self, control: &mut watch::Receiver<Control>) -> Result<Wake, ConnectorError> {
        if let Some(at) = self.bridge.next_percept_time() {
            return self.jump_to(at, control).await;
        }

        self.bridge.idle().await?;
        let notify = self.bridge.notifier();
        trace!(model = %self.model.id(), "waiting for percepts");
        loop {
            tokio::select! {
                () = notify.notified() => {}
                () = stop_requested(control) => return Ok(Wake::Stop),
            }
            if let Some(at) = self.bridge.next_percept_time() {
                return self.jump_to(at, control).await;
            }
            // Permit left by a percept an earlier cycle already took.
            trace!(model = %self.model.id(), "stale percept wakeup");
        }
    }

    /// Moves the clock forward to a percept's timestamp, if it lies ahead.
    async fn jump_to(&self, at: f64, control: &mut watch::Receiver<Control>) -> Result<Wake, ConnectorError> {
        if at > self.model.time() {
            debug!(model = %self.model.id(), from = self.model.time(), to = at, "clock jumps to percept");
            if !self.advance(at, control).await? {
                return Ok(Wake::Stop);
            }
        }
        Ok(Wake::Percept)
    }

    fn apply_percepts(&self, now: f64) {
        let buffers = self.model.buffers();
        for (timestamp, percept) in self.bridge.take_percepts(now) {
            let Some(decl) = buffers.decl(&percept.buffer) else {
                warn!(model = %self.model.id(), buffer = %percept.buffer, "percept for undeclared buffer dropped");
                continue;
            };
            if let Some(expected) = decl.accepts.as_deref() {
                if expected != percept.chunk.chunk_type() {
                    warn!(
                        model = %self.model.id(),
                        buffer = %percept.buffer,
                        expected,
                        actual = percept.chunk.chunk_type(),
                        "percept of wrong chunk type dropped"
                    );
                    continue;
                }
            }
            debug!(model = %self.model.id(), buffer = %percept.buffer, timestamp, chunk = %percept.chunk, "percept applied");
            buffers.set(&percept.buffer, Some(Arc::new(percept.chunk)), BufferState::Free);
        }
    }

    fn publish(&self, event: ModelEvent) {
        self.model.events().publish(event);
    }
}

/// Resolves once a stop is requested. Never resolves otherwise.
async fn stop_requested(control: &mut watch::Receiver<Control>) {
    loop {
        let stop = control.borrow().stop;
        if stop {
            return;
        }
        if control.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
