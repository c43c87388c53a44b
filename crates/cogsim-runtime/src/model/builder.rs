//! Fluent construction of model definitions in code.

use super::buffer::BufferDecl;
use super::chunk::{Chunk, ChunkType};
use super::definition::ModelDefinition;
use super::error::ModelDefinitionError;
use super::model::Model;
use super::production::Production;

/// Builds a [`ModelDefinition`] step by step.
///
/// Nothing is checked until [`load`](Self::load) (or
/// [`ModelDefinition::validate`] on the built definition).
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    definition: ModelDefinition,
}

impl ModelBuilder {
    /// Starts a definition named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: ModelDefinition {
                name: name.into(),
                ..ModelDefinition::default()
            },
        }
    }

    /// Declares a chunk type.
    #[must_use]
    pub fn chunk_type(mut self, name: impl Into<String>, slots: &[&str]) -> Self {
        self.definition
            .chunk_types
            .push(ChunkType::new(name, slots.iter().copied()));
        self
    }

    /// Declares a buffer accepting any chunk type.
    #[must_use]
    pub fn buffer(mut self, name: impl Into<String>) -> Self {
        self.definition.buffers.push(BufferDecl::new(name));
        self
    }

    /// Declares a buffer restricted to one chunk type.
    #[must_use]
    pub fn typed_buffer(mut self, name: impl Into<String>, accepts: impl Into<String>) -> Self {
        self.definition.buffers.push(BufferDecl {
            name: name.into(),
            accepts: Some(accepts.into()),
        });
        self
    }

    /// Adds a named chunk.
    #[must_use]
    pub fn chunk(mut self, chunk: Chunk) -> Self {
        self.definition.chunks.push(chunk);
        self
    }

    /// Places a named chunk in a buffer at load.
    #[must_use]
    pub fn initial(mut self, buffer: impl Into<String>, chunk: impl Into<String>) -> Self {
        self.definition.initial.insert(buffer.into(), chunk.into());
        self
    }

    /// Appends a production.
    #[must_use]
    pub fn production(mut self, production: Production) -> Self {
        self.definition.productions.push(production);
        self
    }

    /// Returns the definition without validating it.
    #[must_use]
    pub fn build(self) -> ModelDefinition {
        self.definition
    }

    /// Validates and loads the model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelDefinitionError`] if the definition is malformed.
    pub fn load(self) -> Result<Model, ModelDefinitionError> {
        Model::load(self.definition)
    }
}
