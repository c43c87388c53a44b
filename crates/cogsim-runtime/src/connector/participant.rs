//! Client side of a session.
//!
//! ```text
//! Participant::connect
//!   ├── Hello ─────────────────► authority
//!   ├── ◄──── Welcome | Rejected (bounded by handshake_timeout)
//!   └── reader task
//!         TimeGrant   → granted watch, TimeGranted event
//!         Percept     → PerceptReceived event
//!         MotorCommand→ MotorReceived event
//!         LockGrant   → wakes the oldest live lock() waiter, or releases
//!         Disconnect  → DisconnectAck, Disconnected event
//! ```

use super::envelope::{Credentials, Envelope, MotorCommand, Payload, Percept, Role};
use super::error::ConnectorError;
use super::transport::{self, Endpoint, LocalHub};
use super::ConnectorEvent;
use crate::config::ConnectorConfig;
use cogsim_event::EventDispatcher;
use cogsim_types::{ParticipantId, SessionId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// What a participant announces in its `Hello`.
#[derive(Debug, Clone)]
pub struct ParticipantSpec {
    /// Session role.
    pub role: Role,
    /// Identity and secret.
    pub credentials: Credentials,
    /// Whether the authority waits for this participant's time requests.
    pub clocked: bool,
}

impl ParticipantSpec {
    /// An unclocked participant.
    #[must_use]
    pub fn new(role: Role, credentials: Credentials) -> Self {
        Self {
            role,
            credentials,
            clocked: false,
        }
    }

    /// Makes the authority wait for this participant before granting time.
    #[must_use]
    pub fn clocked(mut self) -> Self {
        self.clocked = true;
        self
    }
}

struct Shared {
    id: ParticipantId,
    session: SessionId,
    role: Role,
    identity: String,
    tx: mpsc::Sender<Envelope>,
    granted: watch::Sender<f64>,
    closed: watch::Sender<bool>,
    lock_waiters: Mutex<HashMap<String, VecDeque<oneshot::Sender<()>>>>,
    disconnect_ack: Mutex<Option<oneshot::Sender<()>>>,
    disconnecting: AtomicBool,
    events: Arc<EventDispatcher<ConnectorEvent>>,
}

impl Shared {
    fn envelope(&self, payload: Payload) -> Envelope {
        Envelope::new(self.session, self.id, *self.granted.borrow(), payload)
    }

    async fn send(&self, payload: Payload) -> Result<(), ConnectorError> {
        if *self.closed.borrow() {
            return Err(ConnectorError::Disconnected);
        }
        self.tx
            .send(self.envelope(payload))
            .await
            .map_err(|_| ConnectorError::Disconnected)
    }

    /// Passes a grant to the oldest local `lock()` still waiting for it.
    ///
    /// Returns `false` if every waiter for `name` has gone away.
    fn hand_lock_to_waiter(&self, name: &str) -> bool {
        let mut waiters = self.lock_waiters.lock();
        let Some(queue) = waiters.get_mut(name) else {
            return false;
        };
        let mut delivered = false;
        while let Some(waiter) = queue.pop_front() {
            if waiter.send(()).is_ok() {
                delivered = true;
                break;
            }
        }
        if queue.is_empty() {
            waiters.remove(name);
        }
        delivered
    }

    /// Marks the link closed once; later calls are no-ops.
    fn mark_closed(&self, reason: Option<String>) {
        if self.closed.send_replace(true) {
            return;
        }
        // Dropping the senders fails every pending lock() with Disconnected.
        self.lock_waiters.lock().clear();
        info!(participant = %self.id, identity = %self.identity, reason = ?reason, "participant disconnected");
        self.events.publish(ConnectorEvent::Disconnected { reason });
    }
}

/// A connected session member.
///
/// Sensors, effectors and the per-model agents are all participants; they
/// differ only in role and in whether they are clocked.
pub struct Participant {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("identity", &self.shared.identity)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Participant {
    /// Connects to the authority at `endpoint` and performs the handshake.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::EndpointNotFound`] if no authority listens there
    /// - [`ConnectorError::Rejected`] if the credentials are refused
    /// - [`ConnectorError::HandshakeTimeout`] if no answer arrives in time
    pub async fn connect(
        hub: &LocalHub,
        endpoint: &Endpoint,
        spec: ParticipantSpec,
        config: &ConnectorConfig,
    ) -> Result<Self, ConnectorError> {
        let mut link = transport::connect(hub, endpoint, config.link_buffer).await?;
        let identity = spec.credentials.identity.clone();

        link.send(Envelope::new(
            SessionId::unassigned(),
            ParticipantId::new(),
            0.0,
            Payload::Hello {
                role: spec.role,
                credentials: spec.credentials,
                clocked: spec.clocked,
            },
        ))
        .await?;

        let reply = tokio::time::timeout(config.handshake_timeout(), link.recv())
            .await
            .map_err(|_| ConnectorError::HandshakeTimeout {
                endpoint: endpoint.to_string(),
            })?
            .ok_or(ConnectorError::Disconnected)?;

        let (id, session, time) = match reply.payload {
            Payload::Welcome {
                participant,
                session,
                time,
            } => (participant, session, time),
            Payload::Rejected { reason } => {
                warn!(%endpoint, identity = %identity, reason = %reason, "connection rejected");
                return Err(ConnectorError::Rejected { reason });
            }
            other => {
                return Err(ConnectorError::protocol(format!(
                    "expected welcome, got {}",
                    other.kind()
                )))
            }
        };

        let (tx, rx) = link.split();
        let (granted, _) = watch::channel(time);
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            id,
            session,
            role: spec.role,
            identity,
            tx,
            granted,
            closed,
            lock_waiters: Mutex::new(HashMap::new()),
            disconnect_ack: Mutex::new(None),
            disconnecting: AtomicBool::new(false),
            events: Arc::new(EventDispatcher::new(format!("participant:{}", spec.role))),
        });

        info!(%endpoint, participant = %id, role = %spec.role, identity = %shared.identity, "participant connected");
        shared.events.publish(ConnectorEvent::Connected {
            participant: id,
            session,
        });

        let reader = tokio::spawn(read_loop(Arc::clone(&shared), rx));
        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Id assigned by the authority.
    #[must_use]
    pub fn id(&self) -> ParticipantId {
        self.shared.id
    }

    /// Session joined.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.shared.session
    }

    /// Role announced in the handshake.
    #[must_use]
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Identity announced in the handshake.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    /// Latest granted time.
    #[must_use]
    pub fn time(&self) -> f64 {
        *self.shared.granted.borrow()
    }

    /// Returns `false` once the link is gone.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !*self.shared.closed.borrow()
    }

    /// Percept, motor and lifecycle notifications.
    #[must_use]
    pub fn events(&self) -> &Arc<EventDispatcher<ConnectorEvent>> {
        &self.shared.events
    }

    /// Asks to advance to `until` and suspends until granted.
    ///
    /// Returns the granted time, which is at least `until`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disconnected`] if the link closes first.
    pub async fn request_time(&self, until: f64) -> Result<f64, ConnectorError> {
        let mut granted = self.shared.granted.subscribe();
        let mut closed = self.shared.closed.subscribe();
        if *granted.borrow_and_update() >= until {
            return Ok(*granted.borrow());
        }

        self.shared.send(Payload::TimeRequest { until: Some(until) }).await?;
        loop {
            let now = *granted.borrow_and_update();
            if now >= until {
                trace!(participant = %self.shared.id, until, granted = now, "time granted");
                return Ok(now);
            }
            if *closed.borrow_and_update() {
                return Err(ConnectorError::Disconnected);
            }
            tokio::select! {
                changed = granted.changed() => {
                    if changed.is_err() {
                        return Err(ConnectorError::Disconnected);
                    }
                }
                _ = closed.changed() => {}
            }
        }
    }

    /// Tells the authority this participant will not hold back the clock
    /// until its next request.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disconnected`] if the link is gone.
    pub async fn idle(&self) -> Result<(), ConnectorError> {
        self.shared.send(Payload::TimeRequest { until: None }).await
    }

    /// Sends a percept stamped with the current granted time.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disconnected`] if the link is gone.
    pub async fn send_percept(&self, percept: Percept) -> Result<(), ConnectorError> {
        self.shared.send(Payload::Percept(percept)).await
    }

    /// Sends a percept stamped with `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disconnected`] if the link is gone.
    pub async fn send_percept_at(&self, timestamp: f64, percept: Percept) -> Result<(), ConnectorError> {
        if *self.shared.closed.borrow() {
            return Err(ConnectorError::Disconnected);
        }
        let mut envelope = self.shared.envelope(Payload::Percept(percept));
        envelope.timestamp = timestamp;
        self.shared
            .tx
            .send(envelope)
            .await
            .map_err(|_| ConnectorError::Disconnected)
    }

    /// Sends a motor command.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disconnected`] if the link is gone.
    pub async fn send_motor(&self, command: MotorCommand) -> Result<(), ConnectorError> {
        self.shared.send(Payload::MotorCommand(command)).await
    }

    /// Suspends until the named lock is granted to this participant.
    ///
    /// Cancel-safe: dropping the future gives up the place in the queue,
    /// and a grant it already received is released again.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disconnected`] if the link closes while
    /// waiting.
    pub async fn lock(&self, name: &str) -> Result<(), ConnectorError> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .lock_waiters
            .lock()
            .entry(name.to_string())
            .or_default()
            .push_back(tx);
        let mut waiter = LockWaiter {
            shared: &self.shared,
            name,
            rx,
            done: false,
        };
        self.shared
            .send(Payload::LockRequest {
                name: name.to_string(),
            })
            .await?;
        let granted = (&mut waiter.rx).await.map_err(|_| ConnectorError::Disconnected);
        waiter.done = true;
        granted
    }

    /// Releases the named lock.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disconnected`] if the link is gone.
    pub async fn unlock(&self, name: &str) -> Result<(), ConnectorError> {
        self.shared
            .send(Payload::LockRelease {
                name: name.to_string(),
            })
            .await
    }

    /// Leaves the session and waits for the authority's acknowledgement.
    ///
    /// Idempotent; calling it on a closed link returns at once.
    ///
    /// # Errors
    ///
    /// Currently infallible; a missing acknowledgement only logs.
    pub async fn disconnect(&self) -> Result<(), ConnectorError> {
        if self.shared.disconnecting.swap(true, Ordering::AcqRel) || !self.is_connected() {
            self.shared.mark_closed(None);
            return Ok(());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        *self.shared.disconnect_ack.lock() = Some(ack_tx);

        if self.shared.send(Payload::Disconnect { reason: None }).await.is_ok()
            && tokio::time::timeout(self.shutdown_timeout, ack_rx).await.is_err()
        {
            warn!(participant = %self.shared.id, "no disconnect acknowledgement");
        }

        self.shared.mark_closed(None);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        Ok(())
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

/// A pending `lock()` call.
///
/// A grant that lands after the caller stopped waiting goes back to the
/// authority so the next participant in line gets it.
struct LockWaiter<'a> {
    shared: &'a Arc<Shared>,
    name: &'a str,
    rx: oneshot::Receiver<()>,
    done: bool,
}

impl Drop for LockWaiter<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_err() {
            // Never granted; a later grant finds the sender closed.
            return;
        }
        debug!(participant = %self.shared.id, lock = self.name, "lock() dropped after grant, releasing");
        let shared = Arc::clone(self.shared);
        let name = self.name.to_string();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = shared.send(Payload::LockRelease { name }).await;
            });
        }
    }
}

async fn read_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<Envelope>) {
    let mut reason = Some("link closed".to_string());

    while let Some(envelope) = rx.recv().await {
        trace!(participant = %shared.id, kind = envelope.payload.kind(), "received");
        match envelope.payload {
            Payload::TimeGrant { until } => {
                shared.granted.send_if_modified(|g| {
                    if until > *g {
                        *g = until;
                        true
                    } else {
                        false
                    }
                });
                shared.events.publish(ConnectorEvent::TimeGranted { until });
            }
            Payload::Percept(percept) => {
                shared.events.publish(ConnectorEvent::PerceptReceived {
                    percept,
                    timestamp: envelope.timestamp,
                });
            }
            Payload::MotorCommand(command) => {
                shared.events.publish(ConnectorEvent::MotorReceived {
                    command,
                    timestamp: envelope.timestamp,
                });
            }
            Payload::LockGrant { name } => {
                if shared.hand_lock_to_waiter(&name) {
                    shared.events.publish(ConnectorEvent::LockGranted { name });
                } else {
                    debug!(participant = %shared.id, lock = %name, "no live waiter for lock grant, releasing");
                    let _ = shared.send(Payload::LockRelease { name }).await;
                }
            }
            Payload::Disconnect { reason: why } => {
                let _ = shared
                    .tx
                    .send(Envelope::new(
                        shared.session,
                        shared.id,
                        envelope.timestamp,
                        Payload::DisconnectAck,
                    ))
                    .await;
                reason = why.or_else(|| Some("authority disconnected".to_string()));
                break;
            }
            Payload::DisconnectAck => {
                if let Some(ack) = shared.disconnect_ack.lock().take() {
                    let _ = ack.send(());
                }
                reason = None;
                break;
            }
            other => {
                warn!(participant = %shared.id, kind = other.kind(), "unexpected payload from authority");
            }
        }
    }

    shared.mark_closed(reason);
}
