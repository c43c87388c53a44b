//! Conflict-set elements.

use super::production::{Bindings, Production};
use std::sync::Arc;

/// A production plus one consistent set of bindings and its score.
///
/// Built fresh every cycle by the matcher; the winner is published in
/// [`ModelEvent::InstantiationFired`](super::ModelEvent::InstantiationFired).
#[derive(Debug, Clone)]
pub struct Instantiation {
    production: Arc<Production>,
    bindings: Bindings,
    score: f64,
    production_index: usize,
    discovery_index: usize,
}

impl Instantiation {
    pub(crate) fn new(
        production: Arc<Production>,
        bindings: Bindings,
        production_index: usize,
        discovery_index: usize,
    ) -> Self {
        Self {
            production,
            bindings,
            score: 0.0,
            production_index,
            discovery_index,
        }
    }

    /// The matched production.
    #[must_use]
    pub fn production(&self) -> &Arc<Production> {
        &self.production
    }

    /// Shortcut for the production name.
    #[must_use]
    pub fn production_name(&self) -> &str {
        &self.production.name
    }

    /// Variable bindings in discovery order.
    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Score assigned during conflict resolution.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    pub(crate) fn set_score(&mut self, score: f64) {
        self.score = score;
    }

    /// Position of the production in the model's declaration order.
    #[must_use]
    pub fn production_index(&self) -> usize {
        self.production_index
    }

    /// Position of this binding among the production's matches.
    #[must_use]
    pub fn discovery_index(&self) -> usize {
        self.discovery_index
    }
}
