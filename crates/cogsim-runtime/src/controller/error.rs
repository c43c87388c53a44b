//! Controller errors.

use crate::connector::ConnectorError;
use cogsim_types::{ErrorCode, ModelId};
use thiserror::Error;

/// Errors returned by [`Controller`](super::Controller).
///
/// Failures inside a model's run are not controller errors; they end
/// that model as `Aborted` and show up in its [`CompletionReport`](super::CompletionReport).
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The model is running or paused and cannot be removed.
    #[error("model {model} is running")]
    ModelRunning { model: ModelId },

    /// No managed model has this id.
    #[error("unknown model {model}")]
    UnknownModel { model: ModelId },

    /// The model is already managed by this controller.
    #[error("model {model} is already managed")]
    DuplicateModel { model: ModelId },

    /// Attaching or detaching a model failed.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl ErrorCode for ControllerError {
    fn code(&self) -> &'static str {
        match self {
            Self::ModelRunning { .. } => "CONTROLLER_MODEL_RUNNING",
            Self::UnknownModel { .. } => "CONTROLLER_UNKNOWN_MODEL",
            Self::DuplicateModel { .. } => "CONTROLLER_DUPLICATE_MODEL",
            Self::Connector(_) => "CONTROLLER_CONNECTOR",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::ModelRunning { .. } => true,
            Self::UnknownModel { .. } | Self::DuplicateModel { .. } => false,
            Self::Connector(e) => e.is_recoverable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogsim_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        let model = ModelId::new("m");
        assert_error_codes(
            &[
                ControllerError::ModelRunning { model: model.clone() },
                ControllerError::UnknownModel { model: model.clone() },
                ControllerError::DuplicateModel { model },
                ControllerError::Connector(ConnectorError::Disconnected),
            ],
            "CONTROLLER_",
        );
    }

    #[test]
    fn connector_error_keeps_message() {
        let err = ControllerError::from(ConnectorError::Disconnected);
        assert_eq!(err.to_string(), ConnectorError::Disconnected.to_string());
    }
}
