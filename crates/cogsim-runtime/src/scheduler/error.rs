//! Scheduler errors.

use crate::model::ModelStatus;
use cogsim_types::ErrorCode;
use thiserror::Error;

/// Why a cycle loop could not start.
///
/// Failures during a run are not errors of the scheduler; they end the run
/// with status `Aborted` and are reported in the [`RunOutcome`](super::RunOutcome).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// Another cycle loop drives the model.
    #[error("model '{model}' is already being run")]
    AlreadyRunning { model: String },

    /// The model is not in a state that can start.
    #[error("model '{model}' cannot run from status {status}")]
    NotRunnable { model: String, status: ModelStatus },
}

impl ErrorCode for SchedulerError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => "SCHEDULER_ALREADY_RUNNING",
            Self::NotRunnable { .. } => "SCHEDULER_NOT_RUNNABLE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogsim_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[
                SchedulerError::AlreadyRunning { model: "m".into() },
                SchedulerError::NotRunnable {
                    model: "m".into(),
                    status: ModelStatus::Completed,
                },
            ],
            "SCHEDULER_",
        );
    }
}
