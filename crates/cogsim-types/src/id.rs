//! Identifier types for cogsim.
//!
//! All identifiers are UUID-based so they survive the trip across the
//! connector transport unchanged.

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

/// cogsim namespace UUID for deterministic UUID v5 generation.
const COGSIM_NAMESPACE: Uuid = uuid!("5f0c7a2e-3b8d-4e61-9a47-c2d1e8b93f06");

/// Identifier for a model instance managed by a controller.
///
/// A model is known to researchers by its name (the name in the model
/// definition), but two instances of the same definition can run side by
/// side, so the identity carries a UUID as well.
///
/// # UUID Strategy
///
/// - [`ModelId::new`]: random UUID v4, one per installed instance
/// - [`ModelId::named`]: UUID v5 derived from the name, stable across
///   processes (used when a remote environment must address the model)
///
/// # Equality Semantics
///
/// `PartialEq` compares the UUID and the name. For name-only comparison
/// use [`name_eq`](Self::name_eq).
///
/// # Example
///
/// ```
/// use cogsim_types::ModelId;
///
/// let a = ModelId::named("count");
/// let b = ModelId::named("count");
/// assert_eq!(a, b);
///
/// let c = ModelId::new("count");
/// let d = ModelId::new("count");
/// assert_ne!(c, d);
/// assert!(c.name_eq(&d));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId {
    /// Model name from the definition.
    pub name: String,
    /// Instance identifier.
    pub uuid: Uuid,
}

impl ModelId {
    /// Creates a new [`ModelId`] with a random UUID v4.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
        }
    }

    /// Creates a [`ModelId`] whose UUID is derived from the name.
    ///
    /// ```
    /// use cogsim_types::ModelId;
    ///
    /// assert_ne!(ModelId::named("a").uuid, ModelId::named("b").uuid);
    /// ```
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uuid: Uuid::new_v5(&COGSIM_NAMESPACE, format!("model:{name}").as_bytes()),
            name,
        }
    }

    /// Compares two ids by name only, ignoring the UUID.
    #[must_use]
    pub fn name_eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model:{}@{}", self.name, self.uuid)
    }
}

/// Identifier for a participant connected to an environment session.
///
/// Assigned by the environment authority when it accepts a handshake.
/// Participants that share credentials still get distinct ids.
///
/// # Example
///
/// ```
/// use cogsim_types::ParticipantId;
///
/// let a = ParticipantId::new();
/// let b = ParticipantId::new();
/// assert_ne!(a, b);
/// assert!(a.to_string().starts_with("participant:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Creates a new [`ParticipantId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The id used by the authority when it stamps its own envelopes.
    #[must_use]
    pub fn authority() -> Self {
        Self(Uuid::nil())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "participant:{}", self.0)
    }
}

/// Identifier for one environment session.
///
/// A session is created when an authority binds an endpoint and lasts
/// until that authority shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

#[allow(clippy::new_without_default)] // sessions are minted only by Authority::bind
impl SessionId {
    /// Creates a new [`SessionId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Placeholder used by participants before the handshake completes.
    #[must_use]
    pub fn unassigned() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the pre-handshake placeholder.
    #[must_use]
    pub fn is_unassigned(&self) -> bool {
        self.0.is_nil()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Identifier for a committed chunk.
///
/// Chunks are immutable once committed; a modification produces a new
/// chunk with a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub Uuid);

impl ChunkId {
    /// Creates a new [`ChunkId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk:{}", self.0)
    }
}
