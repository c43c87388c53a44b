//! Events published by a model and its scheduler.

use super::buffer::BufferState;
use super::chunk::Chunk;
use super::instantiation::Instantiation;
use cogsim_types::ModelId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle status of a model.
///
/// ```text
/// Unloaded → Ready → Running ⇄ Paused
///                       │
///                       ├─► Completed
///                       ├─► Aborted
///                       └─► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Created, not yet validated.
    Unloaded,
    /// Loaded and runnable.
    Ready,
    /// A cycle loop is driving the model.
    Running,
    /// Suspended at a cycle boundary.
    Paused,
    /// Finished normally.
    Completed,
    /// Finished because of an unrecoverable error.
    Aborted,
    /// Finished because a stop was requested.
    Stopped,
}

impl ModelStatus {
    /// Returns `true` for `Completed`, `Aborted` and `Stopped`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Stopped)
    }

    /// Returns `true` while a cycle loop owns the model.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Where a running model is inside its current cycle.
///
/// ```text
/// Ready ─► Matching ─► Resolving ─► Firing ─► Ready
///                           └── empty conflict set ──► Ready
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Between cycles.
    #[default]
    Ready,
    /// Unifying productions against the buffers.
    Matching,
    /// Scoring the conflict set.
    Resolving,
    /// Applying the selected instantiation's actions.
    Firing,
}

/// Model-level event.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// The model's status changed.
    StatusChanged {
        model: ModelId,
        old: ModelStatus,
        new: ModelStatus,
        /// Abort reason, when `new` is `Aborted`.
        reason: Option<String>,
    },
    /// A cycle began.
    CycleStarted { model: ModelId, cycle: u64, time: f64 },
    /// A cycle ended and the clock was committed.
    CycleFinished { model: ModelId, cycle: u64, time: f64 },
    /// Matching produced no instantiation.
    ConflictSetEmpty { model: ModelId, cycle: u64, time: f64 },
    /// The selected instantiation fired.
    InstantiationFired {
        model: ModelId,
        cycle: u64,
        time: f64,
        instantiation: Arc<Instantiation>,
        /// Simulated seconds the firing consumed.
        consumed: f64,
    },
    /// A buffer's contents or state changed.
    BufferChanged {
        model: ModelId,
        buffer: String,
        old: Option<Arc<Chunk>>,
        new: Option<Arc<Chunk>>,
        state: BufferState,
    },
}

impl ModelEvent {
    /// The model that published the event.
    #[must_use]
    pub fn model(&self) -> &ModelId {
        match self {
            Self::StatusChanged { model, .. }
            | Self::CycleStarted { model, .. }
            | Self::CycleFinished { model, .. }
            | Self::ConflictSetEmpty { model, .. }
            | Self::InstantiationFired { model, .. }
            | Self::BufferChanged { model, .. } => model,
        }
    }
}
