//! Productions: conditions over buffers and the actions they fire.
//!
//! Productions name buffers, never hold them; the scheduler resolves names
//! against the owning model every cycle.
//!
//! # JSON shape
//!
//! ```json
//! {
//!   "name": "count-up",
//!   "conditions": [
//!     { "kind": "match", "buffer": "goal", "chunk_type": "count",
//!       "slots": [ { "slot": "n", "op": "eq", "term": { "var": "n" } } ] }
//!   ],
//!   "actions": [
//!     { "action": "modify", "buffer": "goal",
//!       "slots": { "done": { "value": { "symbol": "yes" } } } }
//!   ]
//! }
//! ```

use super::chunk::{Chunk, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A constant or a variable in a pattern or template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    /// A literal value.
    Value(Value),
    /// A named variable.
    Var(String),
}

impl Term {
    /// A variable term.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// A symbol constant.
    #[must_use]
    pub fn sym(s: impl Into<String>) -> Self {
        Self::Value(Value::symbol(s))
    }

    /// A number constant.
    #[must_use]
    pub fn num(n: f64) -> Self {
        Self::Value(Value::Number(n))
    }

    /// Returns the variable name if this term is a variable.
    #[must_use]
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(v) => Some(v),
            Self::Value(_) => None,
        }
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Slot test operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotOp {
    /// Equal; binds an unbound variable.
    Eq,
    /// Not equal.
    Ne,
    /// Less than (numbers).
    Lt,
    /// Less than or equal (numbers).
    Le,
    /// Greater than (numbers).
    Gt,
    /// Greater than or equal (numbers).
    Ge,
    /// List membership; an unbound variable binds once per member.
    Contains,
}

impl SlotOp {
    /// Returns `true` if an unbound variable under this operator binds.
    #[must_use]
    pub fn binds(self) -> bool {
        matches!(self, Self::Eq | Self::Contains)
    }
}

/// One slot test in a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotTest {
    /// Slot name.
    pub slot: String,
    /// Operator.
    pub op: SlotOp,
    /// Right-hand side.
    pub term: Term,
}

/// Structural test of a buffer's chunk.
///
/// Only the listed slots matter; unlisted slots are wildcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Buffer the pattern reads.
    pub buffer: String,
    /// Required chunk type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<String>,
    /// Variable bound to the chunk's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Slot tests, applied in order.
    #[serde(default)]
    pub slots: Vec<SlotTest>,
}

impl Pattern {
    /// Starts a pattern on `buffer`.
    #[must_use]
    pub fn on(buffer: impl Into<String>) -> Self {
        Self {
            buffer: buffer.into(),
            chunk_type: None,
            bind: None,
            slots: Vec::new(),
        }
    }

    /// Requires the chunk type.
    #[must_use]
    pub fn of_type(mut self, chunk_type: impl Into<String>) -> Self {
        self.chunk_type = Some(chunk_type.into());
        self
    }

    /// Binds the chunk name to `var`.
    #[must_use]
    pub fn bind(mut self, var: impl Into<String>) -> Self {
        self.bind = Some(var.into());
        self
    }

    /// Adds a slot test.
    #[must_use]
    pub fn test(mut self, slot: impl Into<String>, op: SlotOp, term: impl Into<Term>) -> Self {
        self.slots.push(SlotTest {
            slot: slot.into(),
            op,
            term: term.into(),
        });
        self
    }

    /// Adds an equality test.
    #[must_use]
    pub fn equals(self, slot: impl Into<String>, term: impl Into<Term>) -> Self {
        self.test(slot, SlotOp::Eq, term)
    }
}

/// One condition of a production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// The buffer holds no chunk.
    Empty { buffer: String },
    /// The buffer holds some chunk.
    Full {
        buffer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bind: Option<String>,
    },
    /// A fill is pending on the buffer.
    Requested { buffer: String },
    /// The buffer's chunk matches a pattern.
    Match(Pattern),
}

impl Condition {
    /// `Empty` condition.
    #[must_use]
    pub fn empty(buffer: impl Into<String>) -> Self {
        Self::Empty {
            buffer: buffer.into(),
        }
    }

    /// `Full` condition without binding.
    #[must_use]
    pub fn full(buffer: impl Into<String>) -> Self {
        Self::Full {
            buffer: buffer.into(),
            bind: None,
        }
    }

    /// `Requested` condition.
    #[must_use]
    pub fn requested(buffer: impl Into<String>) -> Self {
        Self::Requested {
            buffer: buffer.into(),
        }
    }

    /// Name of the buffer this condition reads.
    #[must_use]
    pub fn buffer(&self) -> &str {
        match self {
            Self::Empty { buffer } | Self::Full { buffer, .. } | Self::Requested { buffer } => buffer,
            Self::Match(p) => &p.buffer,
        }
    }
}

impl From<Pattern> for Condition {
    fn from(p: Pattern) -> Self {
        Self::Match(p)
    }
}

/// Blueprint for a chunk created by an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTemplate {
    /// Chunk name; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Chunk type.
    pub chunk_type: String,
    /// Slot values.
    #[serde(default)]
    pub slots: BTreeMap<String, Term>,
}

impl ChunkTemplate {
    /// A template of the given type with no slots.
    #[must_use]
    pub fn of_type(chunk_type: impl Into<String>) -> Self {
        Self {
            name: None,
            chunk_type: chunk_type.into(),
            slots: BTreeMap::new(),
        }
    }

    /// Fixes the chunk name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets a slot.
    #[must_use]
    pub fn slot(mut self, slot: impl Into<String>, term: impl Into<Term>) -> Self {
        self.slots.insert(slot.into(), term.into());
        self
    }
}

/// One action of a production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Places a new chunk built from the template.
    Set {
        buffer: String,
        template: ChunkTemplate,
    },
    /// Replaces the buffer's chunk with an updated copy.
    Modify {
        buffer: String,
        slots: BTreeMap<String, Term>,
    },
    /// Empties the buffer.
    Clear { buffer: String },
    /// Empties the buffer, marks it requested and sends a motor command.
    Request {
        buffer: String,
        command: ChunkTemplate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    /// Completes the model after this cycle.
    Stop,
}

impl Action {
    /// `Set` action.
    #[must_use]
    pub fn set(buffer: impl Into<String>, template: ChunkTemplate) -> Self {
        Self::Set {
            buffer: buffer.into(),
            template,
        }
    }

    /// `Modify` action.
    #[must_use]
    pub fn modify(
        buffer: impl Into<String>,
        slots: impl IntoIterator<Item = (&'static str, Term)>,
    ) -> Self {
        Self::Modify {
            buffer: buffer.into(),
            slots: slots
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// `Clear` action.
    #[must_use]
    pub fn clear(buffer: impl Into<String>) -> Self {
        Self::Clear {
            buffer: buffer.into(),
        }
    }

    /// `Request` action with no explicit target.
    #[must_use]
    pub fn request(buffer: impl Into<String>, command: ChunkTemplate) -> Self {
        Self::Request {
            buffer: buffer.into(),
            command,
            target: None,
        }
    }

    /// Buffer written by this action, if any.
    #[must_use]
    pub fn buffer(&self) -> Option<&str> {
        match self {
            Self::Set { buffer, .. }
            | Self::Modify { buffer, .. }
            | Self::Clear { buffer }
            | Self::Request { buffer, .. } => Some(buffer),
            Self::Stop => None,
        }
    }
}

/// A condition/action rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production {
    /// Production name, unique within a model.
    pub name: String,
    /// Conditions, all of which must hold.
    pub conditions: Vec<Condition>,
    /// Actions, applied in order.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Static utility read by [`StaticUtility`](crate::scheduler::StaticUtility).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utility: Option<f64>,
    /// Simulated seconds consumed when this production fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_time: Option<f64>,
}

impl Production {
    /// Starts a production with no conditions or actions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            actions: Vec::new(),
            utility: None,
            action_time: None,
        }
    }

    /// Appends a condition.
    #[must_use]
    pub fn when(mut self, condition: impl Into<Condition>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Appends an action.
    #[must_use]
    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Sets the static utility.
    #[must_use]
    pub fn utility(mut self, utility: f64) -> Self {
        self.utility = Some(utility);
        self
    }

    /// Overrides the cycle time for this production.
    #[must_use]
    pub fn action_time(mut self, seconds: f64) -> Self {
        self.action_time = Some(seconds);
        self
    }
}

/// Variable bindings in discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
}

impl Bindings {
    /// Value bound to `var`.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == var)
            .map(|(_, v)| v)
    }

    /// Binds `var`. The caller checks it was unbound.
    pub(crate) fn bind(&mut self, var: &str, value: Value) {
        self.entries.push((var.to_string(), value));
    }

    /// Bound variables in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a term: a constant as is, a variable through the bindings.
    #[must_use]
    pub fn resolve(&self, term: &Term) -> Option<Value> {
        match term {
            Term::Value(v) => Some(v.clone()),
            Term::Var(name) => self.get(name).cloned(),
        }
    }
}

/// Builds a chunk from a template. Returns the first unbound variable on
/// failure.
pub(crate) fn instantiate_template(
    template: &ChunkTemplate,
    bindings: &Bindings,
    fallback_name: impl FnOnce() -> String,
) -> Result<Chunk, String> {
    let name = template.name.clone().unwrap_or_else(fallback_name);
    let mut chunk = Chunk::new(name, template.chunk_type.clone());
    for (slot, term) in &template.slots {
        let value = bindings
            .resolve(term)
            .ok_or_else(|| term.as_var().unwrap_or_default().to_string())?;
        chunk = chunk.with_slot(slot.clone(), value);
    }
    Ok(chunk)
}
