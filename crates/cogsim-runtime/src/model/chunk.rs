//! Chunks, slot values and chunk types.

use cogsim_types::ChunkId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A slot value.
///
/// Serialized externally tagged, e.g. `{"symbol": "start"}`,
/// `{"number": 3}`, `{"chunk": "goal-1"}`, `"nil"`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// No value.
    #[default]
    Nil,
    /// An atomic symbol.
    Symbol(String),
    /// A number.
    Number(f64),
    /// A reference to another chunk, by chunk name.
    Chunk(String),
    /// An ordered list of values.
    List(Vec<Value>),
}

impl Value {
    /// Creates a symbol value.
    #[must_use]
    pub fn symbol(s: impl Into<String>) -> Self {
        Self::Symbol(s.into())
    }

    /// Creates a number value.
    #[must_use]
    pub fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Creates a chunk reference.
    #[must_use]
    pub fn chunk(name: impl Into<String>) -> Self {
        Self::Chunk(name.into())
    }

    /// Creates a list value.
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Returns the number, if this is one.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Nil`].
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Symbol(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Chunk(c) => write!(f, "<{c}>"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A declared chunk type: name plus the slots its chunks may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkType {
    /// Type name.
    pub name: String,
    /// Declared slot names.
    #[serde(default)]
    pub slots: Vec<String>,
}

impl ChunkType {
    /// Creates a chunk type.
    #[must_use]
    pub fn new(name: impl Into<String>, slots: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            slots: slots.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `slot` is declared.
    #[must_use]
    pub fn declares(&self, slot: &str) -> bool {
        self.slots.iter().any(|s| s == slot)
    }
}

/// A symbolic fact.
///
/// Immutable once placed in a buffer (buffers hold `Arc<Chunk>`).
/// [`Chunk::modified`] produces a new chunk with a fresh [`ChunkId`].
///
/// ```
/// use cogsim_runtime::model::{Chunk, Value};
///
/// let goal = Chunk::new("g", "count").with_slot("n", Value::number(1.0));
/// let next = goal.modified([("n".to_string(), Value::number(2.0))]);
///
/// assert_eq!(next.name(), "g");
/// assert_ne!(next.id(), goal.id());
/// assert_eq!(goal.get("n"), &Value::number(1.0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(skip, default)]
    id: ChunkId,
    name: String,
    chunk_type: String,
    #[serde(default)]
    slots: BTreeMap<String, Value>,
}

impl Chunk {
    /// Creates a chunk with no slot values.
    #[must_use]
    pub fn new(name: impl Into<String>, chunk_type: impl Into<String>) -> Self {
        Self {
            id: ChunkId::new(),
            name: name.into(),
            chunk_type: chunk_type.into(),
            slots: BTreeMap::new(),
        }
    }

    /// Sets a slot value (construction only).
    #[must_use]
    pub fn with_slot(mut self, slot: impl Into<String>, value: Value) -> Self {
        self.slots.insert(slot.into(), value);
        self
    }

    /// Unique identity of this chunk.
    #[must_use]
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// Chunk name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chunk type name.
    #[must_use]
    pub fn chunk_type(&self) -> &str {
        &self.chunk_type
    }

    /// Value of `slot`, or [`Value::Nil`] when unset.
    #[must_use]
    pub fn get(&self, slot: &str) -> &Value {
        const NIL: &Value = &Value::Nil;
        self.slots.get(slot).unwrap_or(NIL)
    }

    /// All set slots, ordered by name.
    #[must_use]
    pub fn slots(&self) -> &BTreeMap<String, Value> {
        &self.slots
    }

    /// Returns a copy with `updates` applied and a new identity.
    #[must_use]
    pub fn modified(&self, updates: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut slots = self.slots.clone();
        slots.extend(updates);
        Self {
            id: ChunkId::new(),
            name: self.name.clone(),
            chunk_type: self.chunk_type.clone(),
            slots,
        }
    }

    /// Structural equality: same type and slot values, identity ignored.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.chunk_type == other.chunk_type && self.slots == other.slots
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} isa {}", self.name, self.chunk_type)?;
        for (slot, value) in &self.slots {
            write!(f, " {slot}={value}")?;
        }
        Ok(())
    }
}
