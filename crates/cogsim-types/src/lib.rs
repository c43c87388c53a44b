//! Core types for cogsim.
//!
//! This crate sits at the bottom of the workspace:
//!
//! ```text
//! cogsim-types    : ids, ErrorCode          ◄── HERE
//! cogsim-event    : EventDispatcher, TaskQueue
//! cogsim-runtime  : models, scheduler, controller, connector, locks
//! cogsim-cli      : the `cogsim` binary
//! ```
//!
//! Nothing here depends on tokio; the types are plain data that the
//! connector serializes into envelopes.

mod error;
mod id;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{ChunkId, ModelId, ParticipantId, SessionId};
