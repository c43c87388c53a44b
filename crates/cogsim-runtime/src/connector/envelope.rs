//! Wire messages exchanged between participants and the authority.
//!
//! Every message is an [`Envelope`]: session, sender, logical timestamp
//! and a typed [`Payload`]. The TCP transport writes one JSON envelope per
//! line; local links pass envelopes directly.

use crate::model::Chunk;
use cogsim_types::{ParticipantId, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Participant role within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Canonical time holder and relay. One per session.
    Authority,
    /// Proxy for one model.
    Agent,
    /// Percept source.
    Sensor,
    /// Motor command sink.
    Effector,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authority => "authority",
            Self::Agent => "agent",
            Self::Sensor => "sensor",
            Self::Effector => "effector",
        };
        f.write_str(s)
    }
}

/// Identity plus shared secret.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Participant identity. Agents use their model's name.
    pub identity: String,
    /// Shared secret.
    pub secret: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"***")
            .finish()
    }
}

/// A buffer fill produced by the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percept {
    /// Buffer to fill.
    pub buffer: String,
    /// Chunk to place.
    pub chunk: Chunk,
    /// Agent identity to deliver to; every agent when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Percept {
    /// A percept for every agent.
    #[must_use]
    pub fn new(buffer: impl Into<String>, chunk: Chunk) -> Self {
        Self {
            buffer: buffer.into(),
            chunk,
            target: None,
        }
    }

    /// Restricts delivery to one agent identity.
    #[must_use]
    pub fn to(mut self, identity: impl Into<String>) -> Self {
        self.target = Some(identity.into());
        self
    }
}

/// A request emitted by a model's `Request` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorCommand {
    /// Identity of the issuing agent.
    pub source: String,
    /// Buffer awaiting the result.
    pub buffer: String,
    /// Command content.
    pub command: Chunk,
    /// Effector identity to deliver to; every effector when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Envelope payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// First message of every link.
    Hello {
        role: Role,
        credentials: Credentials,
        /// Whether the authority must wait for this participant's time
        /// requests before granting.
        clocked: bool,
    },
    /// Handshake accepted.
    Welcome {
        participant: ParticipantId,
        session: SessionId,
        /// Current granted time.
        time: f64,
    },
    /// Handshake refused.
    Rejected { reason: String },
    /// Buffer fill.
    Percept(Percept),
    /// Model request.
    MotorCommand(MotorCommand),
    /// Asks permission to advance to `until`; `None` means the sender is
    /// idle and will not hold back the clock.
    TimeRequest { until: Option<f64> },
    /// Everyone may advance to `until`.
    TimeGrant { until: f64 },
    /// Asks for a named lock.
    LockRequest { name: String },
    /// The named lock now belongs to the recipient.
    LockGrant { name: String },
    /// Gives up a named lock.
    LockRelease { name: String },
    /// Session teardown, from either side.
    Disconnect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Acknowledges a `Disconnect`.
    DisconnectAck,
}

impl Payload {
    /// Short payload name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Welcome { .. } => "welcome",
            Self::Rejected { .. } => "rejected",
            Self::Percept(_) => "percept",
            Self::MotorCommand(_) => "motor_command",
            Self::TimeRequest { .. } => "time_request",
            Self::TimeGrant { .. } => "time_grant",
            Self::LockRequest { .. } => "lock_request",
            Self::LockGrant { .. } => "lock_grant",
            Self::LockRelease { .. } => "lock_release",
            Self::Disconnect { .. } => "disconnect",
            Self::DisconnectAck => "disconnect_ack",
        }
    }
}

/// One message on a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Session the message belongs to; unassigned before `Welcome`.
    pub session: SessionId,
    /// Sender; the authority uses [`ParticipantId::authority`].
    pub participant: ParticipantId,
    /// Sender's logical time in simulated seconds.
    pub timestamp: f64,
    /// Message body.
    pub payload: Payload,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub fn new(session: SessionId, participant: ParticipantId, timestamp: f64, payload: Payload) -> Self {
        Self {
            session,
            participant,
            timestamp,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_secret() {
        let c = Credentials::new("agent-1", "hunter2");
        let shown = format!("{c:?}");
        assert!(shown.contains("agent-1"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn envelope_json_has_kind_tag() {
        let env = Envelope::new(
            SessionId::new(),
            ParticipantId::new(),
            1.5,
            Payload::LockRequest {
                name: "phase1".into(),
            },
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["payload"]["kind"], "lock_request");
        assert_eq!(json["payload"]["name"], "phase1");
        assert_eq!(json["timestamp"], 1.5);
    }

    #[test]
    fn percept_survives_the_wire() {
        let chunk = Chunk::new("loc", "location").with_slot("x", crate::model::Value::number(10.0));
        let env = Envelope::new(
            SessionId::new(),
            ParticipantId::new(),
            0.25,
            Payload::Percept(Percept::new("visual", chunk).to("count")),
        );
        let line = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&line).unwrap();

        match back.payload {
            Payload::Percept(p) => {
                assert_eq!(p.buffer, "visual");
                assert_eq!(p.target.as_deref(), Some("count"));
                assert_eq!(p.chunk.get("x"), &crate::model::Value::number(10.0));
            }
            other => panic!("unexpected payload {}", other.kind()),
        }
    }

    #[test]
    fn unit_payload_roundtrip() {
        let json = r#"{"kind":"disconnect_ack"}"#;
        let p: Payload = serde_json::from_str(json).unwrap();
        assert_eq!(p.kind(), "disconnect_ack");

        let idle: Payload = serde_json::from_str(r#"{"kind":"time_request","until":null}"#).unwrap();
        assert!(matches!(idle, Payload::TimeRequest { until: None }));
    }
}
