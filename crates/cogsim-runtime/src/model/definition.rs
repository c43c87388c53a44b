//! In-memory model definition and its load-time validation.

use super::buffer::BufferDecl;
use super::chunk::{Chunk, ChunkType};
use super::error::ModelDefinitionError;
use super::production::{Action, ChunkTemplate, Condition, Production, Term};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A fully resolved model, as produced by a model-file parser.
///
/// Buffers and productions are kept in declaration order; production order
/// is the conflict-resolution tie-break.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Model name.
    pub name: String,
    /// Declared chunk types.
    #[serde(default)]
    pub chunk_types: Vec<ChunkType>,
    /// Declared buffers.
    pub buffers: Vec<BufferDecl>,
    /// Named chunks available for initial buffer contents.
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    /// Initial buffer contents: buffer name to chunk name.
    #[serde(default)]
    pub initial: BTreeMap<String, String>,
    /// Productions in declaration order.
    #[serde(default)]
    pub productions: Vec<Production>,
}

impl ModelDefinition {
    /// Parses a definition from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ModelDefinitionError::Parse`] on malformed JSON. The result
    /// is not validated; [`Model::load`](super::Model::load) does that.
    pub fn from_json(json: &str) -> Result<Self, ModelDefinitionError> {
        serde_json::from_str(json).map_err(|e| ModelDefinitionError::Parse {
            message: e.to_string(),
        })
    }

    /// Serializes the definition to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ModelDefinitionError::Parse`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ModelDefinitionError> {
        serde_json::to_string_pretty(self).map_err(|e| ModelDefinitionError::Parse {
            message: e.to_string(),
        })
    }

    /// Checks every cross-reference in the definition.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelDefinitionError`] found.
    pub fn validate(&self) -> Result<(), ModelDefinitionError> {
        if self.name.trim().is_empty() {
            return Err(ModelDefinitionError::EmptyName { what: "model" });
        }

        let types = self.collect_types()?;
        let buffers = self.collect_buffers(&types)?;
        let chunks = self.collect_chunks(&types)?;

        for (buffer, chunk_name) in &self.initial {
            let context = format!("initial contents of '{buffer}'");
            let decl = buffers.get(buffer.as_str()).ok_or_else(|| {
                ModelDefinitionError::UnknownBuffer {
                    context: context.clone(),
                    buffer: buffer.clone(),
                }
            })?;
            let chunk = chunks.get(chunk_name.as_str()).ok_or_else(|| {
                ModelDefinitionError::UnknownChunk {
                    context: context.clone(),
                    chunk: chunk_name.clone(),
                }
            })?;
            check_accepts(decl, chunk.chunk_type(), &context)?;
        }

        let mut names = HashSet::new();
        for production in &self.productions {
            if production.name.trim().is_empty() {
                return Err(ModelDefinitionError::EmptyName { what: "production" });
            }
            if !names.insert(production.name.as_str()) {
                return Err(ModelDefinitionError::DuplicateProduction {
                    production: production.name.clone(),
                });
            }
            ProductionCheck {
                production,
                types: &types,
                buffers: &buffers,
                bound: HashSet::new(),
            }
            .run()?;
        }

        Ok(())
    }

    fn collect_types(&self) -> Result<HashMap<&str, &ChunkType>, ModelDefinitionError> {
        let mut types = HashMap::new();
        for t in &self.chunk_types {
            if t.name.trim().is_empty() {
                return Err(ModelDefinitionError::EmptyName { what: "chunk type" });
            }
            if types.insert(t.name.as_str(), t).is_some() {
                return Err(ModelDefinitionError::DuplicateChunkType {
                    chunk_type: t.name.clone(),
                });
            }
        }
        Ok(types)
    }

    fn collect_buffers<'a>(
        &'a self,
        types: &HashMap<&str, &ChunkType>,
    ) -> Result<HashMap<&'a str, &'a BufferDecl>, ModelDefinitionError> {
        let mut buffers = HashMap::new();
        for b in &self.buffers {
            if b.name.trim().is_empty() {
                return Err(ModelDefinitionError::EmptyName { what: "buffer" });
            }
            if let Some(accepts) = &b.accepts {
                if !types.contains_key(accepts.as_str()) {
                    return Err(ModelDefinitionError::UnknownChunkType {
                        context: format!("buffer '{}'", b.name),
                        chunk_type: accepts.clone(),
                    });
                }
            }
            if buffers.insert(b.name.as_str(), b).is_some() {
                return Err(ModelDefinitionError::DuplicateBuffer {
                    buffer: b.name.clone(),
                });
            }
        }
        Ok(buffers)
    }

    fn collect_chunks<'a>(
        &'a self,
        types: &HashMap<&str, &ChunkType>,
    ) -> Result<HashMap<&'a str, &'a Chunk>, ModelDefinitionError> {
        let mut chunks = HashMap::new();
        for c in &self.chunks {
            if c.name().trim().is_empty() {
                return Err(ModelDefinitionError::EmptyName { what: "chunk" });
            }
            let context = format!("chunk '{}'", c.name());
            let chunk_type = lookup_type(types, c.chunk_type(), &context)?;
            for slot in c.slots().keys() {
                check_slot(chunk_type, slot, &context)?;
            }
            if chunks.insert(c.name(), c).is_some() {
                return Err(ModelDefinitionError::DuplicateChunk {
                    chunk: c.name().to_string(),
                });
            }
        }
        Ok(chunks)
    }
}

struct ProductionCheck<'a> {
    production: &'a Production,
    types: &'a HashMap<&'a str, &'a ChunkType>,
    buffers: &'a HashMap<&'a str, &'a BufferDecl>,
    bound: HashSet<&'a str>,
}

impl<'a> ProductionCheck<'a> {
    fn context(&self) -> String {
        format!("production '{}'", self.production.name)
    }

    fn run(mut self) -> Result<(), ModelDefinitionError> {
        let p = self.production;
        if p.conditions.is_empty() {
            return Err(ModelDefinitionError::NoConditions {
                production: p.name.clone(),
            });
        }
        if let Some(time) = p.action_time {
            if !(time.is_finite() && time > 0.0) {
                return Err(ModelDefinitionError::InvalidActionTime {
                    production: p.name.clone(),
                    time,
                });
            }
        }

        for condition in &p.conditions {
            self.condition(condition)?;
        }
        for action in &p.actions {
            self.action(action)?;
        }
        Ok(())
    }

    fn buffer(&self, name: &str) -> Result<&'a BufferDecl, ModelDefinitionError> {
        self.buffers
            .get(name)
            .copied()
            .ok_or_else(|| ModelDefinitionError::UnknownBuffer {
                context: self.context(),
                buffer: name.to_string(),
            })
    }

    fn require_bound(&self, var: &str) -> Result<(), ModelDefinitionError> {
        if self.bound.contains(var) {
            Ok(())
        } else {
            Err(ModelDefinitionError::UnboundVariable {
                production: self.production.name.clone(),
                variable: var.to_string(),
            })
        }
    }

    fn condition(&mut self, condition: &'a Condition) -> Result<(), ModelDefinitionError> {
        self.buffer(condition.buffer())?;
        match condition {
            Condition::Empty { .. } | Condition::Requested { .. } => {}
            Condition::Full { bind, .. } => {
                if let Some(var) = bind {
                    self.bound.insert(var);
                }
            }
            Condition::Match(pattern) => {
                let chunk_type = match &pattern.chunk_type {
                    Some(t) => Some(lookup_type(self.types, t, &self.context())?),
                    None => None,
                };
                if let Some(var) = &pattern.bind {
                    self.bound.insert(var);
                }
                for test in &pattern.slots {
                    if let Some(t) = chunk_type {
                        check_slot(t, &test.slot, &self.context())?;
                    }
                    if let Term::Var(var) = &test.term {
                        if test.op.binds() {
                            self.bound.insert(var);
                        } else {
                            self.require_bound(var)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn template(&self, template: &ChunkTemplate) -> Result<(), ModelDefinitionError> {
        let context = self.context();
        let chunk_type = lookup_type(self.types, &template.chunk_type, &context)?;
        for (slot, term) in &template.slots {
            check_slot(chunk_type, slot, &context)?;
            if let Term::Var(var) = term {
                self.require_bound(var)?;
            }
        }
        Ok(())
    }

    fn action(&self, action: &Action) -> Result<(), ModelDefinitionError> {
        match action {
            Action::Set { buffer, template } => {
                let decl = self.buffer(buffer)?;
                self.template(template)?;
                check_accepts(decl, &template.chunk_type, &self.context())?;
            }
            Action::Modify { buffer, slots } => {
                let decl = self.buffer(buffer)?;
                let accepted = match &decl.accepts {
                    Some(t) => Some(lookup_type(self.types, t, &self.context())?),
                    None => None,
                };
                for (slot, term) in slots {
                    if let Some(t) = accepted {
                        check_slot(t, slot, &self.context())?;
                    }
                    if let Term::Var(var) = term {
                        self.require_bound(var)?;
                    }
                }
            }
            Action::Clear { buffer } => {
                self.buffer(buffer)?;
            }
            Action::Request {
                buffer, command, ..
            } => {
                self.buffer(buffer)?;
                self.template(command)?;
            }
            Action::Stop => {}
        }
        Ok(())
    }
}

fn lookup_type<'a>(
    types: &HashMap<&str, &'a ChunkType>,
    name: &str,
    context: &str,
) -> Result<&'a ChunkType, ModelDefinitionError> {
    types
        .get(name)
        .copied()
        .ok_or_else(|| ModelDefinitionError::UnknownChunkType {
            context: context.to_string(),
            chunk_type: name.to_string(),
        })
}

fn check_slot(chunk_type: &ChunkType, slot: &str, context: &str) -> Result<(), ModelDefinitionError> {
    if chunk_type.declares(slot) {
        Ok(())
    } else {
        Err(ModelDefinitionError::UndeclaredSlot {
            context: context.to_string(),
            chunk_type: chunk_type.name.clone(),
            slot: slot.to_string(),
        })
    }
}

fn check_accepts(
    decl: &BufferDecl,
    chunk_type: &str,
    context: &str,
) -> Result<(), ModelDefinitionError> {
    match &decl.accepts {
        Some(expected) if expected != chunk_type => Err(ModelDefinitionError::BufferTypeMismatch {
            context: context.to_string(),
            buffer: decl.name.clone(),
            expected: expected.clone(),
            actual: chunk_type.to_string(),
        }),
        _ => Ok(()),
    }
}
