//! Model-level errors.
//!
//! # Error Codes
//!
//! | Type | Prefix | When |
//! |------|--------|------|
//! | [`ModelDefinitionError`] | `MODEL_` | load time, before any cycle |
//! | [`MatchError`] | `MATCH_` | one binding branch during matching (discarded) |
//! | [`FiringError`] | `FIRING_` | applying an action (aborts the model) |

use cogsim_types::ErrorCode;
use thiserror::Error;

/// A model definition was rejected at load time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelDefinitionError {
    /// The definition could not be parsed.
    #[error("cannot parse model definition: {message}")]
    Parse { message: String },

    /// A name field is empty.
    #[error("{what} name must not be empty")]
    EmptyName { what: &'static str },

    /// Two buffers share a name.
    #[error("buffer '{buffer}' is declared twice")]
    DuplicateBuffer { buffer: String },

    /// Two chunk types share a name.
    #[error("chunk type '{chunk_type}' is declared twice")]
    DuplicateChunkType { chunk_type: String },

    /// Two initial chunks share a name.
    #[error("chunk '{chunk}' is declared twice")]
    DuplicateChunk { chunk: String },

    /// Two productions share a name.
    #[error("production '{production}' is declared twice")]
    DuplicateProduction { production: String },

    /// A reference to an undeclared buffer.
    #[error("{context} refers to undeclared buffer '{buffer}'")]
    UnknownBuffer { context: String, buffer: String },

    /// A reference to an undeclared chunk type.
    #[error("{context} refers to undeclared chunk type '{chunk_type}'")]
    UnknownChunkType { context: String, chunk_type: String },

    /// A reference to an undeclared chunk.
    #[error("{context} refers to undeclared chunk '{chunk}'")]
    UnknownChunk { context: String, chunk: String },

    /// A slot not declared by the chunk type.
    #[error("{context}: chunk type '{chunk_type}' has no slot '{slot}'")]
    UndeclaredSlot {
        context: String,
        chunk_type: String,
        slot: String,
    },

    /// A chunk placed in a buffer that only accepts another type.
    #[error("buffer '{buffer}' accepts '{expected}' chunks, {context} gives '{actual}'")]
    BufferTypeMismatch {
        context: String,
        buffer: String,
        expected: String,
        actual: String,
    },

    /// A variable used before any condition binds it.
    #[error("production '{production}' uses variable '{variable}' before binding it")]
    UnboundVariable { production: String, variable: String },

    /// A production with no conditions.
    #[error("production '{production}' has no conditions")]
    NoConditions { production: String },

    /// A non-positive or non-finite action time.
    #[error("production '{production}' has invalid action time {time}")]
    InvalidActionTime { production: String, time: f64 },
}

impl ErrorCode for ModelDefinitionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "MODEL_PARSE",
            Self::EmptyName { .. } => "MODEL_EMPTY_NAME",
            Self::DuplicateBuffer { .. } => "MODEL_DUPLICATE_BUFFER",
            Self::DuplicateChunkType { .. } => "MODEL_DUPLICATE_CHUNK_TYPE",
            Self::DuplicateChunk { .. } => "MODEL_DUPLICATE_CHUNK",
            Self::DuplicateProduction { .. } => "MODEL_DUPLICATE_PRODUCTION",
            Self::UnknownBuffer { .. } => "MODEL_UNKNOWN_BUFFER",
            Self::UnknownChunkType { .. } => "MODEL_UNKNOWN_CHUNK_TYPE",
            Self::UnknownChunk { .. } => "MODEL_UNKNOWN_CHUNK",
            Self::UndeclaredSlot { .. } => "MODEL_UNDECLARED_SLOT",
            Self::BufferTypeMismatch { .. } => "MODEL_BUFFER_TYPE_MISMATCH",
            Self::UnboundVariable { .. } => "MODEL_UNBOUND_VARIABLE",
            Self::NoConditions { .. } => "MODEL_NO_CONDITIONS",
            Self::InvalidActionTime { .. } => "MODEL_INVALID_ACTION_TIME",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// A binding branch failed during matching.
///
/// Never fatal: the scheduler drops the branch and keeps matching.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    /// A bound variable met a different value.
    #[error("variable '{variable}' bound to {bound}, slot '{slot}' holds {found}")]
    Inconsistent {
        variable: String,
        slot: String,
        bound: String,
        found: String,
    },

    /// An ordering test on a non-number.
    #[error("slot '{slot}' cannot be ordered against {value}")]
    NotComparable { slot: String, value: String },

    /// A test read a variable no earlier condition bound.
    #[error("variable '{variable}' is not bound")]
    UnboundVariable { variable: String },

    /// A membership test on a non-list slot.
    #[error("slot '{slot}' is not a list")]
    NotAList { slot: String },
}

impl ErrorCode for MatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::Inconsistent { .. } => "MATCH_INCONSISTENT",
            Self::NotComparable { .. } => "MATCH_NOT_COMPARABLE",
            Self::UnboundVariable { .. } => "MATCH_UNBOUND_VARIABLE",
            Self::NotAList { .. } => "MATCH_NOT_A_LIST",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

/// An action could not be applied. Aborts the firing model only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FiringError {
    /// The action names a buffer the model does not have.
    #[error("production '{production}' targets undeclared buffer '{buffer}'")]
    UnknownBuffer { production: String, buffer: String },

    /// `Modify` on a buffer with no chunk.
    #[error("production '{production}' modifies empty buffer '{buffer}'")]
    EmptyBuffer { production: String, buffer: String },

    /// A template variable with no binding.
    #[error("production '{production}' uses unbound variable '{variable}'")]
    UnboundVariable {
        production: String,
        variable: String,
    },

    /// The resulting chunk does not fit the buffer.
    #[error("buffer '{buffer}' accepts '{expected}' chunks, got '{actual}'")]
    TypeMismatch {
        buffer: String,
        expected: String,
        actual: String,
    },

    /// The motor command could not be handed to the environment.
    #[error("request on buffer '{buffer}' could not be sent: {reason}")]
    MotorRejected { buffer: String, reason: String },
}

impl ErrorCode for FiringError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownBuffer { .. } => "FIRING_UNKNOWN_BUFFER",
            Self::EmptyBuffer { .. } => "FIRING_EMPTY_BUFFER",
            Self::UnboundVariable { .. } => "FIRING_UNBOUND_VARIABLE",
            Self::TypeMismatch { .. } => "FIRING_TYPE_MISMATCH",
            Self::MotorRejected { .. } => "FIRING_MOTOR_REJECTED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogsim_types::assert_error_codes;

    #[test]
    fn definition_codes() {
        let ctx = || "production 'p'".to_string();
        assert_error_codes(
            &[
                ModelDefinitionError::Parse { message: "x".into() },
                ModelDefinitionError::EmptyName { what: "model" },
                ModelDefinitionError::DuplicateBuffer { buffer: "b".into() },
                ModelDefinitionError::DuplicateChunkType { chunk_type: "t".into() },
                ModelDefinitionError::DuplicateChunk { chunk: "c".into() },
                ModelDefinitionError::DuplicateProduction { production: "p".into() },
                ModelDefinitionError::UnknownBuffer { context: ctx(), buffer: "b".into() },
                ModelDefinitionError::UnknownChunkType { context: ctx(), chunk_type: "t".into() },
                ModelDefinitionError::UnknownChunk { context: ctx(), chunk: "c".into() },
                ModelDefinitionError::UndeclaredSlot {
                    context: ctx(),
                    chunk_type: "t".into(),
                    slot: "s".into(),
                },
                ModelDefinitionError::BufferTypeMismatch {
                    context: ctx(),
                    buffer: "b".into(),
                    expected: "t".into(),
                    actual: "u".into(),
                },
                ModelDefinitionError::UnboundVariable {
                    production: "p".into(),
                    variable: "x".into(),
                },
                ModelDefinitionError::NoConditions { production: "p".into() },
                ModelDefinitionError::InvalidActionTime {
                    production: "p".into(),
                    time: -1.0,
                },
            ],
            "MODEL_",
        );
    }

    #[test]
    fn match_codes_are_recoverable() {
        let all = [
            MatchError::Inconsistent {
                variable: "x".into(),
                slot: "s".into(),
                bound: "a".into(),
                found: "b".into(),
            },
            MatchError::NotComparable { slot: "s".into(), value: "a".into() },
            MatchError::UnboundVariable { variable: "x".into() },
            MatchError::NotAList { slot: "s".into() },
        ];
        assert_error_codes(&all, "MATCH_");
        assert!(all.iter().all(ErrorCode::is_recoverable));
    }

    #[test]
    fn firing_codes() {
        let all = [
            FiringError::UnknownBuffer { production: "p".into(), buffer: "b".into() },
            FiringError::EmptyBuffer { production: "p".into(), buffer: "b".into() },
            FiringError::UnboundVariable { production: "p".into(), variable: "x".into() },
            FiringError::TypeMismatch {
                buffer: "b".into(),
                expected: "t".into(),
                actual: "u".into(),
            },
            FiringError::MotorRejected { buffer: "b".into(), reason: "closed".into() },
        ];
        assert_error_codes(&all, "FIRING_");
        assert!(!all[1].is_recoverable());
        assert!(all[1].to_string().contains("empty buffer 'b'"));
    }
}
