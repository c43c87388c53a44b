//! Pluggable conflict-resolution scoring, termination and run limits.

use crate::config::SchedulerConfig;
use crate::model::{BufferSnapshot, Instantiation, Model};

/// What a scoring function or termination predicate may look at.
#[derive(Debug, Clone, Copy)]
pub struct ModelState<'a> {
    /// The model being scheduled.
    pub model: &'a Model,
    /// Simulated time at the start of the cycle.
    pub time: f64,
    /// Number of the cycle being run (1-based).
    pub cycle: u64,
    /// Buffers as matched this cycle.
    pub buffers: &'a BufferSnapshot,
}

/// Scores instantiations during conflict resolution. Higher wins.
///
/// Implemented for closures:
///
/// ```
/// use cogsim_runtime::model::Instantiation;
/// use cogsim_runtime::scheduler::{ModelState, ScoringFunction};
/// use std::sync::Arc;
///
/// let prefer_late: Arc<dyn ScoringFunction> =
///     Arc::new(|i: &Instantiation, _: &ModelState<'_>| i.production_index() as f64);
/// # let _ = prefer_late;
/// ```
///
/// A `NaN` score ranks below every other score.
pub trait ScoringFunction: Send + Sync {
    /// Scores one instantiation.
    fn score(&self, instantiation: &Instantiation, state: &ModelState<'_>) -> f64;
}

impl<F> ScoringFunction for F
where
    F: Fn(&Instantiation, &ModelState<'_>) -> f64 + Send + Sync,
{
    fn score(&self, instantiation: &Instantiation, state: &ModelState<'_>) -> f64 {
        self(instantiation, state)
    }
}

/// Gives every instantiation the same score, so declaration order decides.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConstantScore(pub f64);

impl ScoringFunction for ConstantScore {
    fn score(&self, _instantiation: &Instantiation, _state: &ModelState<'_>) -> f64 {
        self.0
    }
}

/// Scores by the production's declared utility; undeclared counts as
/// `default`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StaticUtility {
    /// Score of productions without a utility.
    pub default: f64,
}

impl ScoringFunction for StaticUtility {
    fn score(&self, instantiation: &Instantiation, _state: &ModelState<'_>) -> f64 {
        instantiation.production().utility.unwrap_or(self.default)
    }
}

/// Decides whether a model with an empty conflict set is done.
pub trait TerminationPredicate: Send + Sync {
    /// Returns `true` to complete the model.
    fn should_terminate(&self, state: &ModelState<'_>) -> bool;
}

impl<F> TerminationPredicate for F
where
    F: Fn(&ModelState<'_>) -> bool + Send + Sync,
{
    fn should_terminate(&self, state: &ModelState<'_>) -> bool {
        self(state)
    }
}

/// Completes the model once no buffer waits for a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoPendingRequests;

impl TerminationPredicate for NoPendingRequests {
    fn should_terminate(&self, state: &ModelState<'_>) -> bool {
        !state.buffers.any_requested()
    }
}

/// Never completes on an empty conflict set; the model waits for percepts
/// until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeverTerminate;

impl TerminationPredicate for NeverTerminate {
    fn should_terminate(&self, _state: &ModelState<'_>) -> bool {
        false
    }
}

/// Bounds that end a run as `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunLimits {
    /// Completed cycles after which the run ends.
    pub max_cycles: Option<u64>,
    /// Simulated time at which the run ends.
    pub max_time: Option<f64>,
}

impl RunLimits {
    /// No limits.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Ends the run after `cycles` cycles.
    #[must_use]
    pub fn cycles(cycles: u64) -> Self {
        Self {
            max_cycles: Some(cycles),
            max_time: None,
        }
    }

    /// Returns why the run should end, if a limit is reached.
    #[must_use]
    pub fn reached(&self, cycles: u64, time: f64) -> Option<String> {
        if let Some(max) = self.max_cycles {
            if cycles >= max {
                return Some(format!("cycle limit {max} reached"));
            }
        }
        if let Some(max) = self.max_time {
            if time >= max {
                return Some(format!("time limit {max}s reached"));
            }
        }
        None
    }
}

impl From<&SchedulerConfig> for RunLimits {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_cycles: config.max_cycles,
            max_time: config.max_time,
        }
    }
}
