//! Connector errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`ConnectorError::EndpointInUse`] | `CONNECTOR_ENDPOINT_IN_USE` | No |
//! | [`ConnectorError::EndpointNotFound`] | `CONNECTOR_ENDPOINT_NOT_FOUND` | Yes |
//! | [`ConnectorError::Rejected`] | `CONNECTOR_REJECTED` | No |
//! | [`ConnectorError::HandshakeTimeout`] | `CONNECTOR_HANDSHAKE_TIMEOUT` | Yes |
//! | [`ConnectorError::Protocol`] | `CONNECTOR_PROTOCOL` | No |
//! | [`ConnectorError::Disconnected`] | `CONNECTOR_DISCONNECTED` | No |
//! | [`ConnectorError::NotConnected`] | `CONNECTOR_NOT_CONNECTED` | No |
//! | [`ConnectorError::Io`] | `CONNECTOR_IO` | Yes |

use cogsim_types::ErrorCode;
use thiserror::Error;

/// Connector failure.
///
/// Authentication failures are final; the connector never retries on its
/// own. Retrying is the caller's decision.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Another authority already serves this endpoint.
    #[error("endpoint '{endpoint}' already has an authority")]
    EndpointInUse { endpoint: String },

    /// Nothing listens on the endpoint.
    #[error("no authority at endpoint '{endpoint}'")]
    EndpointNotFound { endpoint: String },

    /// The authority refused the credentials.
    #[error("connection rejected: {reason}")]
    Rejected { reason: String },

    /// No `Welcome` arrived in time.
    #[error("handshake with '{endpoint}' timed out")]
    HandshakeTimeout { endpoint: String },

    /// The peer sent something unexpected or undecodable.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The link is closed.
    #[error("link disconnected")]
    Disconnected,

    /// No bridge exists for this model.
    #[error("model '{model}' is not connected")]
    NotConnected { model: String },

    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

impl ErrorCode for ConnectorError {
    fn code(&self) -> &'static str {
        match self {
            Self::EndpointInUse { .. } => "CONNECTOR_ENDPOINT_IN_USE",
            Self::EndpointNotFound { .. } => "CONNECTOR_ENDPOINT_NOT_FOUND",
            Self::Rejected { .. } => "CONNECTOR_REJECTED",
            Self::HandshakeTimeout { .. } => "CONNECTOR_HANDSHAKE_TIMEOUT",
            Self::Protocol { .. } => "CONNECTOR_PROTOCOL",
            Self::Disconnected => "CONNECTOR_DISCONNECTED",
            Self::NotConnected { .. } => "CONNECTOR_NOT_CONNECTED",
            Self::Io(_) => "CONNECTOR_IO",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EndpointNotFound { .. } | Self::HandshakeTimeout { .. } | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogsim_types::assert_error_codes;

    fn all_variants() -> Vec<ConnectorError> {
        vec![
            ConnectorError::EndpointInUse { endpoint: "local:999".into() },
            ConnectorError::EndpointNotFound { endpoint: "local:999".into() },
            ConnectorError::Rejected { reason: "bad secret".into() },
            ConnectorError::HandshakeTimeout { endpoint: "local:999".into() },
            ConnectorError::protocol("garbage"),
            ConnectorError::Disconnected,
            ConnectorError::NotConnected { model: "m".into() },
            ConnectorError::Io(std::io::Error::new(std::io::ErrorKind::Other, "reset")),
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "CONNECTOR_");
    }

    #[test]
    fn rejection_is_final() {
        let err = ConnectorError::Rejected { reason: "bad secret".into() };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("bad secret"));
    }
}
