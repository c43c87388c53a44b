//! Buffers: single-chunk working-memory slots.
//!
//! A model's [`BufferSet`] is fixed at load. Every mutation, whether from a
//! firing action or a connector fill, goes through [`BufferSet::set`],
//! which swaps the contents under that buffer's lock and then publishes a
//! [`ModelEvent::BufferChanged`].

use super::chunk::Chunk;
use super::event::ModelEvent;
use cogsim_event::EventDispatcher;
use cogsim_types::ModelId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Declared buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDecl {
    /// Buffer name.
    pub name: String,
    /// Only chunks of this type may be placed in the buffer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts: Option<String>,
}

impl BufferDecl {
    /// A buffer that accepts any chunk type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepts: None,
        }
    }
}

/// Request state of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferState {
    /// No fill pending.
    #[default]
    Free,
    /// A request was sent; the environment has not filled it yet.
    Requested,
}

#[derive(Debug, Default)]
struct Slot {
    chunk: Option<Arc<Chunk>>,
    state: BufferState,
}

#[derive(Debug)]
struct Buffer {
    decl: BufferDecl,
    slot: Mutex<Slot>,
}

/// Contents of one buffer at a point in time.
#[derive(Debug, Clone, Default)]
pub struct BufferView {
    /// Current chunk.
    pub chunk: Option<Arc<Chunk>>,
    /// Request state.
    pub state: BufferState,
}

/// Point-in-time copy of every buffer, used for matching and scoring.
#[derive(Debug, Clone, Default)]
pub struct BufferSnapshot {
    views: HashMap<String, BufferView>,
}

impl BufferSnapshot {
    /// View of `buffer`, if declared.
    #[must_use]
    pub fn get(&self, buffer: &str) -> Option<&BufferView> {
        self.views.get(buffer)
    }

    /// Chunk in `buffer`, if any.
    #[must_use]
    pub fn chunk(&self, buffer: &str) -> Option<&Arc<Chunk>> {
        self.views.get(buffer).and_then(|v| v.chunk.as_ref())
    }

    /// Returns `true` if any buffer has a pending request.
    #[must_use]
    pub fn any_requested(&self) -> bool {
        self.views
            .values()
            .any(|v| v.state == BufferState::Requested)
    }
}

/// The fixed set of buffers owned by one model.
pub struct BufferSet {
    model: ModelId,
    buffers: Vec<Buffer>,
    index: HashMap<String, usize>,
    events: Arc<EventDispatcher<ModelEvent>>,
}

impl std::fmt::Debug for BufferSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSet")
            .field("model", &self.model)
            .field("buffers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl BufferSet {
    pub(crate) fn new(
        model: ModelId,
        decls: &[BufferDecl],
        events: Arc<EventDispatcher<ModelEvent>>,
    ) -> Self {
        let buffers: Vec<Buffer> = decls
            .iter()
            .map(|decl| Buffer {
                decl: decl.clone(),
                slot: Mutex::new(Slot::default()),
            })
            .collect();
        let index = buffers
            .iter()
            .enumerate()
            .map(|(i, b)| (b.decl.name.clone(), i))
            .collect();
        Self {
            model,
            buffers,
            index,
            events,
        }
    }

    /// Buffer names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buffers.iter().map(|b| b.decl.name.as_str())
    }

    /// Returns `true` if `buffer` is declared.
    #[must_use]
    pub fn contains(&self, buffer: &str) -> bool {
        self.index.contains_key(buffer)
    }

    /// Declaration of `buffer`.
    #[must_use]
    pub fn decl(&self, buffer: &str) -> Option<&BufferDecl> {
        self.index.get(buffer).map(|&i| &self.buffers[i].decl)
    }

    /// Current chunk of `buffer`.
    #[must_use]
    pub fn chunk(&self, buffer: &str) -> Option<Arc<Chunk>> {
        self.index
            .get(buffer)
            .and_then(|&i| self.buffers[i].slot.lock().chunk.clone())
    }

    /// Current request state of `buffer`.
    #[must_use]
    pub fn state(&self, buffer: &str) -> Option<BufferState> {
        self.index
            .get(buffer)
            .map(|&i| self.buffers[i].slot.lock().state)
    }

    /// Replaces the contents of `buffer`.
    ///
    /// Returns `false` (and changes nothing) if `buffer` is not declared.
    pub fn set(&self, buffer: &str, chunk: Option<Arc<Chunk>>, state: BufferState) -> bool {
        let Some(&i) = self.index.get(buffer) else {
            return false;
        };

        let old = {
            let mut slot = self.buffers[i].slot.lock();
            slot.state = state;
            std::mem::replace(&mut slot.chunk, chunk.clone())
        };
        // Published unlocked: listeners may read buffers.
        self.events.publish(ModelEvent::BufferChanged {
            model: self.model.clone(),
            buffer: buffer.to_string(),
            old,
            new: chunk,
            state,
        });
        true
    }

    /// Copies every buffer.
    #[must_use]
    pub fn snapshot(&self) -> BufferSnapshot {
        let views = self
            .buffers
            .iter()
            .map(|b| {
                let slot = b.slot.lock();
                (
                    b.decl.name.clone(),
                    BufferView {
                        chunk: slot.chunk.clone(),
                        state: slot.state,
                    },
                )
            })
            .collect();
        BufferSnapshot { views }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogsim_event::listener_fn;

    fn set_with_counter() -> (BufferSet, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(EventDispatcher::new("buffers"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        events.register(listener_fn("record", move |e: &ModelEvent| {
            if let ModelEvent::BufferChanged { buffer, .. } = e {
                s.lock().push(buffer.clone());
            }
        }));
        let set = BufferSet::new(
            ModelId::named("m"),
            &[BufferDecl::new("goal"), BufferDecl::new("visual")],
            events,
        );
        (set, seen)
    }

    #[test]
    fn set_publishes_change() {
        let (set, seen) = set_with_counter();
        let chunk = Arc::new(Chunk::new("g", "start"));

        assert!(set.set("goal", Some(Arc::clone(&chunk)), BufferState::Free));
        assert!(Arc::ptr_eq(&set.chunk("goal").unwrap(), &chunk));
        assert_eq!(*seen.lock(), vec!["goal".to_string()]);
    }

    #[test]
    fn set_unknown_buffer_is_rejected() {
        let (set, seen) = set_with_counter();
        assert!(!set.set("motor", None, BufferState::Free));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn snapshot_reflects_state() {
        let (set, _) = set_with_counter();
        set.set("visual", None, BufferState::Requested);

        let snap = set.snapshot();
        assert!(snap.any_requested());
        assert!(snap.chunk("goal").is_none());
        assert_eq!(snap.get("visual").unwrap().state, BufferState::Requested);
        assert!(snap.get("motor").is_none());
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["goal", "visual"]);
    }
}
