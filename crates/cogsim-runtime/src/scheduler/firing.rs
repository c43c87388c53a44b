//! Applies the actions of the selected instantiation.

use crate::connector::MotorCommand;
use crate::model::{instantiate_template, Action, BufferState, FiringError, Instantiation, Model};
use std::sync::Arc;
use tracing::trace;

/// Side effects the cycle loop still has to carry out.
#[derive(Debug, Default)]
pub(crate) struct Fired {
    /// Motor commands to submit, in action order.
    pub motor: Vec<MotorCommand>,
    /// A `Stop` action ran.
    pub stop: bool,
}

/// Applies actions in order. Buffer writes happen here; motor commands are
/// returned for the caller to submit.
pub(crate) fn fire(model: &Model, instantiation: &Instantiation) -> Result<Fired, FiringError> {
    let production = instantiation.production();
    let bindings = instantiation.bindings();
    let buffers = model.buffers();
    let mut fired = Fired::default();

    let unknown = |buffer: &str| FiringError::UnknownBuffer {
        production: production.name.clone(),
        buffer: buffer.to_string(),
    };
    let unbound = |variable: String| FiringError::UnboundVariable {
        production: production.name.clone(),
        variable,
    };

    for action in &production.actions {
        trace!(model = %model.id(), production = %production.name, ?action, "applying action");
        match action {
            Action::Set { buffer, template } => {
                let decl = buffers.decl(buffer).ok_or_else(|| unknown(buffer))?;
                let chunk = instantiate_template(template, bindings, || model.next_chunk_name(&template.chunk_type))
                    .map_err(unbound)?;
                if let Some(expected) = decl.accepts.as_deref() {
                    if expected != chunk.chunk_type() {
                        return Err(FiringError::TypeMismatch {
                            buffer: buffer.clone(),
                            expected: expected.to_string(),
                            actual: chunk.chunk_type().to_string(),
                        });
                    }
                }
                buffers.set(buffer, Some(Arc::new(chunk)), BufferState::Free);
            }
            Action::Modify { buffer, slots } => {
                if !buffers.contains(buffer) {
                    return Err(unknown(buffer));
                }
                let current = buffers.chunk(buffer).ok_or_else(|| FiringError::EmptyBuffer {
                    production: production.name.clone(),
                    buffer: buffer.clone(),
                })?;
                let mut updates = Vec::with_capacity(slots.len());
                for (slot, term) in slots {
                    let value = bindings
                        .resolve(term)
                        .ok_or_else(|| unbound(term.as_var().unwrap_or_default().to_string()))?;
                    updates.push((slot.clone(), value));
                }
                let state = buffers.state(buffer).unwrap_or_default();
                buffers.set(buffer, Some(Arc::new(current.modified(updates))), state);
            }
            Action::Clear { buffer } => {
                if !buffers.set(buffer, None, BufferState::Free) {
                    return Err(unknown(buffer));
                }
            }
            Action::Request {
                buffer,
                command,
                target,
            } => {
                if !buffers.contains(buffer) {
                    return Err(unknown(buffer));
                }
                let command = instantiate_template(command, bindings, || model.next_chunk_name(&command.chunk_type))
                    .map_err(unbound)?;
                buffers.set(buffer, None, BufferState::Requested);
                fired.motor.push(MotorCommand {
                    source: model.name().to_string(),
                    buffer: buffer.clone(),
                    command,
                    target: target.clone(),
                });
            }
            Action::Stop => fired.stop = true,
        }
    }

    Ok(fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bindings, Chunk, ChunkTemplate, Condition, ModelBuilder, Production, Term, Value};
    use crate::scheduler::matcher::match_production;

    fn model(production: Production) -> Model {
        ModelBuilder::new("m")
            .chunk_type("goal", &["state", "n"])
            .chunk_type("cmd", &["word"])
            .buffer("goal")
            .typed_buffer("vocal", "cmd")
            .chunk(Chunk::new("g0", "goal").with_slot("state", Value::symbol("start")).with_slot("n", Value::number(1.0)))
            .initial("goal", "g0")
            .production(production)
            .load()
            .unwrap()
    }

    fn instantiate(model: &Model) -> Instantiation {
        let production = Arc::clone(&model.productions()[0]);
        let bindings = match_production(&production, &model.buffers().snapshot())
            .into_iter()
            .next()
            .unwrap_or_else(Bindings::default);
        Instantiation::new(production, bindings, 0, 0)
    }

    #[test]
    fn modify_is_copy_on_write() {
        let m = model(
            Production::new("p")
                .when(crate::model::Pattern::on("goal").equals("n", Term::var("n")))
                .then(Action::modify("goal", [("state", Term::sym("next")), ("n", Term::var("n"))])),
        );
        let before = m.buffers().chunk("goal").unwrap();

        let fired = fire(&m, &instantiate(&m)).unwrap();
        assert!(!fired.stop);

        let after = m.buffers().chunk("goal").unwrap();
        assert_eq!(after.name(), "g0");
        assert_eq!(after.get("state"), &Value::symbol("next"));
        assert_eq!(after.get("n"), &Value::number(1.0));
        assert_ne!(after.id(), before.id());
        assert_eq!(before.get("state"), &Value::symbol("start"));
    }

    #[test]
    fn request_marks_buffer_and_emits_command() {
        let m = model(
            Production::new("p")
                .when(Condition::full("goal"))
                .then(Action::request("vocal", ChunkTemplate::of_type("cmd").slot("word", Term::sym("hi"))))
                .then(Action::Stop),
        );

        let fired = fire(&m, &instantiate(&m)).unwrap();
        assert!(fired.stop);
        assert_eq!(fired.motor.len(), 1);
        assert_eq!(fired.motor[0].source, "m");
        assert_eq!(fired.motor[0].command.get("word"), &Value::symbol("hi"));
        assert_eq!(m.buffers().state("vocal"), Some(BufferState::Requested));
        assert!(m.buffers().chunk("vocal").is_none());
    }

    #[test]
    fn modify_on_empty_buffer_fails() {
        let m = model(
            Production::new("p")
                .when(Condition::full("goal"))
                .then(Action::clear("goal"))
                .then(Action::modify("goal", [("state", Term::sym("x"))])),
        );

        let err = fire(&m, &instantiate(&m)).unwrap_err();
        assert!(matches!(err, FiringError::EmptyBuffer { .. }));
    }

    #[test]
    fn set_generates_names() {
        let m = model(
            Production::new("p")
                .when(Condition::full("goal"))
                .then(Action::set("goal", ChunkTemplate::of_type("goal"))),
        );

        fire(&m, &instantiate(&m)).unwrap();
        assert_eq!(m.buffers().chunk("goal").unwrap().name(), "goal-1");
    }
}
