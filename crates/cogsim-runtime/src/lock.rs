//! Named locks for barriering distributed participants.
//!
//! The authority keeps one [`LockTable`] per session. Participants ask for a
//! lock by name and suspend until it is granted:
//!
//! ```text
//!  X: lock("phase1") ──► Granted          holder = X, queue = []
//!  Y: lock("phase1") ──► Queued           holder = X, queue = [Y]
//!  X: unlock("phase1") ─► next = Y        holder = Y, queue = []
//! ```
//!
//! Queues are FIFO with one entry per request; a holder asking again waits
//! behind itself. When a participant leaves, [`LockTable::release_all`] hands every lock it held
//! to the next waiter and drops it from every queue.
//!
//! Experiment scripts name locks with `${var}` placeholders; [`LockStep`]
//! and [`UnlockStep`] resolve them against a [`VariableContext`] first.

use crate::connector::{ConnectorError, Participant};
use cogsim_types::{ErrorCode, ParticipantId};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, trace};

/// Named-lock failure.
#[derive(Debug, Error)]
pub enum LockError {
    /// Release by someone other than the holder.
    #[error("'{who}' does not hold lock '{name}'")]
    NotHolder { name: String, who: ParticipantId },

    /// A `${var}` placeholder has no value.
    #[error("lock name '{template}' references unknown variable '{variable}'")]
    UnresolvedVariable { template: String, variable: String },

    /// The participant link failed while locking or unlocking.
    #[error("lock '{name}' failed: {source}")]
    Transport {
        name: String,
        #[source]
        source: ConnectorError,
    },
}

impl ErrorCode for LockError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotHolder { .. } => "LOCK_NOT_HOLDER",
            Self::UnresolvedVariable { .. } => "LOCK_UNRESOLVED_VARIABLE",
            Self::Transport { .. } => "LOCK_TRANSPORT",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotHolder { .. })
    }
}

/// Result of [`LockTable::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller holds the lock now.
    Granted,
    /// The caller waits behind the holder.
    Queued,
}

#[derive(Debug)]
struct LockEntry {
    holder: ParticipantId,
    waiters: VecDeque<ParticipantId>,
}

/// Session-wide lock name → holder plus FIFO wait queue.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: BTreeMap<String, LockEntry>,
}

impl LockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for `name` on behalf of `who`.
    pub fn acquire(&mut self, name: &str, who: ParticipantId) -> LockOutcome {
        match self.locks.get_mut(name) {
            None => {
                self.locks.insert(
                    name.to_string(),
                    LockEntry {
                        holder: who,
                        waiters: VecDeque::new(),
                    },
                );
                debug!(lock = name, holder = %who, "lock granted");
                LockOutcome::Granted
            }
            Some(entry) => {
                entry.waiters.push_back(who);
                trace!(lock = name, waiter = %who, depth = entry.waiters.len(), "lock queued");
                LockOutcome::Queued
            }
        }
    }

    /// Releases `name` held by `who`.
    ///
    /// Returns the next holder, if anyone was waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotHolder`] if `who` does not hold the lock.
    pub fn release(&mut self, name: &str, who: ParticipantId) -> Result<Option<ParticipantId>, LockError> {
        let entry = match self.locks.get_mut(name) {
            Some(entry) if entry.holder == who => entry,
            _ => {
                return Err(LockError::NotHolder {
                    name: name.to_string(),
                    who,
                })
            }
        };

        match entry.waiters.pop_front() {
            Some(next) => {
                entry.holder = next;
                debug!(lock = name, from = %who, to = %next, "lock handed over");
                Ok(Some(next))
            }
            None => {
                self.locks.remove(name);
                debug!(lock = name, holder = %who, "lock released");
                Ok(None)
            }
        }
    }

    /// Releases everything `who` holds and removes it from every queue.
    ///
    /// Returns each released lock with its next holder, in name order.
    pub fn release_all(&mut self, who: ParticipantId) -> Vec<(String, Option<ParticipantId>)> {
        for entry in self.locks.values_mut() {
            entry.waiters.retain(|w| *w != who);
        }

        let held: Vec<String> = self
            .locks
            .iter()
            .filter(|(_, entry)| entry.holder == who)
            .map(|(name, _)| name.clone())
            .collect();

        held.into_iter()
            .filter_map(|name| {
                let next = self.release(&name, who).ok()?;
                Some((name, next))
            })
            .collect()
    }

    /// Current holder of `name`.
    #[must_use]
    pub fn holder(&self, name: &str) -> Option<ParticipantId> {
        self.locks.get(name).map(|e| e.holder)
    }

    /// Participants waiting for `name`, front first.
    #[must_use]
    pub fn waiters(&self, name: &str) -> Vec<ParticipantId> {
        self.locks
            .get(name)
            .map(|e| e.waiters.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of held locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if no lock is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Values for `${var}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    values: HashMap<String, String>,
}

impl VariableContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) {
        self.values.insert(name.into(), value.to_string());
    }

    /// Looks a variable up.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Replaces every `${var}` in `template`.
    ///
    /// An unterminated `${` is kept literally.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::UnresolvedVariable`] for an unknown variable.
    pub fn resolve(&self, template: &str) -> Result<String, LockError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start + 2..].find('}') else {
                break;
            };
            let variable = &rest[start + 2..start + 2 + len];
            let value = self.get(variable).ok_or_else(|| LockError::UnresolvedVariable {
                template: template.to_string(),
                variable: variable.to_string(),
            })?;
            out.push_str(&rest[..start]);
            out.push_str(value);
            rest = &rest[start + 3 + len..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Experiment checkpoint that waits for a named lock.
#[derive(Debug, Clone)]
pub struct LockStep {
    name: String,
}

impl LockStep {
    /// Creates a step for the lock name template `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Resolves the name and suspends until the lock is granted.
    ///
    /// Returns the resolved lock name.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] if the name does not resolve or the link fails.
    pub async fn run(&self, participant: &Participant, vars: &VariableContext) -> Result<String, LockError> {
        let name = vars.resolve(&self.name)?;
        participant
            .lock(&name)
            .await
            .map_err(|source| LockError::Transport {
                name: name.clone(),
                source,
            })?;
        Ok(name)
    }
}

/// Experiment checkpoint that releases a named lock.
#[derive(Debug, Clone)]
pub struct UnlockStep {
    name: String,
}

impl UnlockStep {
    /// Creates a step for the lock name template `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Resolves the name and releases the lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] if the name does not resolve or the link fails.
    pub async fn run(&self, participant: &Participant, vars: &VariableContext) -> Result<String, LockError> {
        let name = vars.resolve(&self.name)?;
        participant
            .unlock(&name)
            .await
            .map_err(|source| LockError::Transport {
                name: name.clone(),
                source,
            })?;
        Ok(name)
    }
}
