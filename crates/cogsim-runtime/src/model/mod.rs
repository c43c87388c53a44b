//! Models: chunks, buffers, productions and the loaded model instance.
//!
//! ```text
//! ModelDefinition ──validate──► Model ─┬─ BufferSet   (goal, visual, ...)
//!   (serde / ModelBuilder)             ├─ Productions (declaration order)
//!                                      ├─ clock, status, run guard
//!                                      └─ EventDispatcher<ModelEvent>
//! ```
//!
//! Malformed definitions are rejected by [`Model::load`] with a
//! [`ModelDefinitionError`] before any cycle can run.

mod buffer;
mod builder;
mod chunk;
mod definition;
mod error;
mod event;
mod instantiation;
#[allow(clippy::module_inception)]
mod model;
mod production;

pub use buffer::{BufferDecl, BufferSet, BufferSnapshot, BufferState, BufferView};
pub use builder::ModelBuilder;
pub use chunk::{Chunk, ChunkType, Value};
pub use definition::ModelDefinition;
pub use error::{FiringError, MatchError, ModelDefinitionError};
pub use event::{CyclePhase, ModelEvent, ModelStatus};
pub use instantiation::Instantiation;
pub use model::Model;
pub(crate) use model::Control;
pub(crate) use production::instantiate_template;
pub use production::{Action, Bindings, ChunkTemplate, Condition, Pattern, Production, SlotOp, SlotTest, Term};
