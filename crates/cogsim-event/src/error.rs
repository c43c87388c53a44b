//! Dispatch layer errors.
//!
//! None of these ever reach the publisher: the dispatcher logs them and
//! keeps fanning out. They surface directly only from [`TaskQueue`]
//! construction and submission.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`DispatchError::QueueFull`] | `DISPATCH_QUEUE_FULL` | Yes |
//! | [`DispatchError::QueueClosed`] | `DISPATCH_QUEUE_CLOSED` | No |
//! | [`DispatchError::ListenerPanicked`] | `DISPATCH_LISTENER_PANICKED` | No |
//! | [`DispatchError::WorkerSpawn`] | `DISPATCH_WORKER_SPAWN` | Yes |
//!
//! [`TaskQueue`]: crate::TaskQueue

use cogsim_types::ErrorCode;
use thiserror::Error;

/// Event dispatch error.
///
/// ```
/// use cogsim_event::DispatchError;
/// use cogsim_types::ErrorCode;
///
/// let err = DispatchError::QueueFull { queue: "trace".into() };
/// assert_eq!(err.code(), "DISPATCH_QUEUE_FULL");
/// assert!(err.is_rejection());
/// ```
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The task queue is at capacity; the submission was refused.
    #[error("task queue '{queue}' is full")]
    QueueFull {
        /// Queue name.
        queue: String,
    },

    /// The task queue has been shut down.
    #[error("task queue '{queue}' is shut down")]
    QueueClosed {
        /// Queue name.
        queue: String,
    },

    /// A listener panicked while handling an event.
    #[error("listener '{listener}' panicked: {message}")]
    ListenerPanicked {
        /// Listener name.
        listener: String,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The queue worker thread could not be started.
    #[error("failed to start worker for task queue '{queue}': {reason}")]
    WorkerSpawn {
        /// Queue name.
        queue: String,
        /// OS error text.
        reason: String,
    },
}

impl DispatchError {
    /// Returns `true` for executor rejections (full or closed queue).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::QueueClosed { .. })
    }
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::QueueFull { .. } => "DISPATCH_QUEUE_FULL",
            Self::QueueClosed { .. } => "DISPATCH_QUEUE_CLOSED",
            Self::ListenerPanicked { .. } => "DISPATCH_LISTENER_PANICKED",
            Self::WorkerSpawn { .. } => "DISPATCH_WORKER_SPAWN",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::WorkerSpawn { .. })
    }
}
