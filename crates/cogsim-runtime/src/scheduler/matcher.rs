//! Matching and conflict resolution.
//!
//! Each production's conditions are unified left to right against one
//! buffer snapshot. Every condition maps each partial binding set (a
//! branch) to zero or more extended branches:
//!
//! ```text
//! [{}] ──Full goal, bind g──► [{g}] ──visual.items contains ?x──► [{g,x=a},{g,x=b}]
//! ```
//!
//! A [`MatchError`] kills only the branch it occurred on.

use super::policy::{ModelState, ScoringFunction};
use crate::model::{
    Bindings, BufferSnapshot, BufferState, Chunk, Condition, Instantiation, MatchError, Pattern, Production,
    SlotOp, SlotTest, Term, Value,
};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

/// All instantiations of `productions`, in declaration then discovery order.
pub(crate) fn conflict_set(productions: &[Arc<Production>], buffers: &BufferSnapshot) -> Vec<Instantiation> {
    let mut set = Vec::new();
    for (production_index, production) in productions.iter().enumerate() {
        for (discovery_index, bindings) in match_production(production, buffers).into_iter().enumerate() {
            set.push(Instantiation::new(
                Arc::clone(production),
                bindings,
                production_index,
                discovery_index,
            ));
        }
    }
    set
}

/// Scores the set and picks the winner.
///
/// Only a strictly higher score replaces the current best, so ties go to
/// the earlier production and then the earlier binding.
pub(crate) fn select(
    set: Vec<Instantiation>,
    scoring: &dyn ScoringFunction,
    state: &ModelState<'_>,
) -> Option<Instantiation> {
    let mut best: Option<Instantiation> = None;
    for mut candidate in set {
        let score = scoring.score(&candidate, state);
        candidate.set_score(if score.is_nan() { f64::NEG_INFINITY } else { score });
        match &best {
            Some(current) if candidate.score() <= current.score() => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Every consistent binding set under which all conditions hold.
pub(crate) fn match_production(production: &Production, buffers: &BufferSnapshot) -> Vec<Bindings> {
    let mut branches = vec![Bindings::default()];
    for condition in &production.conditions {
        branches = branches
            .into_iter()
            .flat_map(|bindings| match_condition(condition, buffers, bindings))
            .collect();
        if branches.is_empty() {
            break;
        }
    }
    branches
}

fn match_condition(condition: &Condition, buffers: &BufferSnapshot, bindings: Bindings) -> Vec<Bindings> {
    let Some(view) = buffers.get(condition.buffer()) else {
        return Vec::new();
    };

    match condition {
        Condition::Empty { .. } => keep_if(view.chunk.is_none(), bindings),
        Condition::Requested { .. } => keep_if(view.state == BufferState::Requested, bindings),
        Condition::Full { bind, .. } => match (&view.chunk, bind) {
            (None, _) => Vec::new(),
            (Some(_), None) => vec![bindings],
            (Some(chunk), Some(var)) => bind_chunk(var, chunk, bindings),
        },
        Condition::Match(pattern) => match &view.chunk {
            Some(chunk) => match_pattern(pattern, chunk, bindings),
            None => Vec::new(),
        },
    }
}

fn keep_if(holds: bool, bindings: Bindings) -> Vec<Bindings> {
    if holds {
        vec![bindings]
    } else {
        Vec::new()
    }
}

fn bind_chunk(var: &str, chunk: &Chunk, mut bindings: Bindings) -> Vec<Bindings> {
    let value = Value::chunk(chunk.name());
    match bindings.get(var) {
        Some(bound) => keep_if(*bound == value, bindings),
        None => {
            bindings.bind(var, value);
            vec![bindings]
        }
    }
}

fn match_pattern(pattern: &Pattern, chunk: &Chunk, bindings: Bindings) -> Vec<Bindings> {
    if pattern
        .chunk_type
        .as_deref()
        .is_some_and(|t| t != chunk.chunk_type())
    {
        return Vec::new();
    }

    let mut branches = match &pattern.bind {
        Some(var) => bind_chunk(var, chunk, bindings),
        None => vec![bindings],
    };

    for test in &pattern.slots {
        let mut next = Vec::new();
        for bindings in branches {
            match apply_test(test, chunk, bindings) {
                Ok(extended) => next.extend(extended),
                Err(e) => trace!(buffer = %pattern.buffer, error = %e, "binding branch discarded"),
            }
        }
        branches = next;
        if branches.is_empty() {
            break;
        }
    }
    branches
}

fn apply_test(test: &SlotTest, chunk: &Chunk, mut bindings: Bindings) -> Result<Vec<Bindings>, MatchError> {
    let actual = chunk.get(&test.slot);

    match test.op {
        SlotOp::Eq => match &test.term {
            Term::Var(var) => match bindings.get(var) {
                Some(bound) if bound == actual => Ok(vec![bindings]),
                Some(bound) => Err(MatchError::Inconsistent {
                    variable: var.clone(),
                    slot: test.slot.clone(),
                    bound: bound.to_string(),
                    found: actual.to_string(),
                }),
                None if actual.is_nil() => Ok(Vec::new()),
                None => {
                    bindings.bind(var, actual.clone());
                    Ok(vec![bindings])
                }
            },
            Term::Value(expected) => Ok(keep_if(expected == actual, bindings)),
        },
        SlotOp::Ne => {
            let other = resolve(&test.term, &bindings)?;
            Ok(keep_if(other != *actual, bindings))
        }
        SlotOp::Lt | SlotOp::Le | SlotOp::Gt | SlotOp::Ge => {
            let other = resolve(&test.term, &bindings)?;
            let ordering = compare(&test.slot, actual, &other)?;
            let holds = match test.op {
                SlotOp::Lt => ordering == Ordering::Less,
                SlotOp::Le => ordering != Ordering::Greater,
                SlotOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(keep_if(holds, bindings))
        }
        SlotOp::Contains => {
            let Value::List(items) = actual else {
                return Err(MatchError::NotAList {
                    slot: test.slot.clone(),
                });
            };
            match &test.term {
                Term::Var(var) if bindings.get(var).is_none() => Ok(items
                    .iter()
                    .map(|item| {
                        let mut branch = bindings.clone();
                        branch.bind(var, item.clone());
                        branch
                    })
                    .collect()),
                term => {
                    let wanted = resolve(term, &bindings)?;
                    Ok(keep_if(items.contains(&wanted), bindings))
                }
            }
        }
    }
}

fn resolve(term: &Term, bindings: &Bindings) -> Result<Value, MatchError> {
    bindings.resolve(term).ok_or_else(|| MatchError::UnboundVariable {
        variable: term.as_var().unwrap_or_default().to_string(),
    })
}

fn compare(slot: &str, actual: &Value, other: &Value) -> Result<Ordering, MatchError> {
    let not_comparable = |value: &Value| MatchError::NotComparable {
        slot: slot.to_string(),
        value: value.to_string(),
    };
    let a = actual.as_number().ok_or_else(|| not_comparable(actual))?;
    let b = other.as_number().ok_or_else(|| not_comparable(other))?;
    a.partial_cmp(&b).ok_or_else(|| not_comparable(other))
}
