//! Cognitive cycle scheduler.
//!
//! One [`Scheduler`] drives one model. Each cycle:
//!
//! 1. applies percepts whose timestamp is not in the model's future,
//! 2. matches every production against a buffer snapshot,
//! 3. scores the conflict set with the model's [`ScoringFunction`] and
//!    selects exactly one instantiation (ties: declaration order, then
//!    binding discovery order),
//! 4. fires it, or on an empty set advances by the idle increment and
//!    either completes (see [`TerminationPredicate`]) or sleeps until a
//!    percept arrives,
//! 5. waits for the connector to grant the next time and commits the clock.
//!
//! Cycles of one model never overlap: a run guard on the model rejects a
//! second driver with [`SchedulerError::AlreadyRunning`].

mod cycle;
mod error;
mod firing;
mod matcher;
mod policy;

pub use cycle::{RunOutcome, Scheduler};
pub use error::SchedulerError;
pub use policy::{
    ConstantScore, ModelState, NeverTerminate, NoPendingRequests, RunLimits, ScoringFunction, StaticUtility,
    TerminationPredicate,
};
