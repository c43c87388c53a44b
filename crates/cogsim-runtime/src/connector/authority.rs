//! Environment authority: canonical clock, relay and lock table of a session.
//!
//! ```text
//!                      ┌──────────────── Authority ────────────────┐
//!  link ─► handshake ─►│ members   id → role, identity, clocked,  │
//!  (one task per link) │           pending time request           │
//!                      │ granted   canonical time                 │
//!                      │ locks     LockTable                      │
//!                      └──────────────────────────────────────────┘
//! ```
//!
//! # Time
//!
//! Every clocked member posts `TimeRequest { until }`. Once all of them
//! have one outstanding, the authority grants the smallest finite `until`
//! and broadcasts `TimeGrant` to every member. An idle request
//! (`until: None`) never holds the clock back. A request at or below the
//! current grant is answered at once.
//!
//! # Teardown
//!
//! A link that closes without `Disconnect` is treated as a departure: the
//! member's locks go to the next waiters and it leaves the clock set, which
//! may release a grant the others were waiting for.

use super::credentials::CredentialStore;
use super::envelope::{Envelope, Payload, Role};
use super::error::ConnectorError;
use super::transport::{self, Acceptor, Endpoint, Link, LocalHub};
use crate::config::ConnectorConfig;
use crate::lock::{LockOutcome, LockTable};
use cogsim_types::{ParticipantId, SessionId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, trace, warn};

const LOCAL_BACKLOG: usize = 16;

#[derive(Debug)]
struct Member {
    role: Role,
    identity: String,
    clocked: bool,
    tx: mpsc::Sender<Envelope>,
    /// `None`: nothing outstanding. `Some(None)`: idle. `Some(Some(t))`: wants `t`.
    pending: Option<Option<f64>>,
}

#[derive(Debug, Default)]
struct SessionState {
    members: BTreeMap<ParticipantId, Member>,
    granted: f64,
    locks: LockTable,
}

impl SessionState {
    /// The grant every clocked member agrees on, if it moves time forward.
    fn next_grant(&self) -> Option<f64> {
        let mut any = false;
        let mut bound = f64::INFINITY;
        for member in self.members.values().filter(|m| m.clocked) {
            any = true;
            match member.pending {
                None => return None,
                Some(None) => {}
                Some(Some(until)) => bound = bound.min(until),
            }
        }
        (any && bound.is_finite() && bound > self.granted).then_some(bound)
    }
}

struct AuthorityInner {
    endpoint: Endpoint,
    session: SessionId,
    hub: LocalHub,
    credentials: CredentialStore,
    config: ConnectorConfig,
    state: Mutex<SessionState>,
    connections: parking_lot::Mutex<JoinSet<()>>,
    listener: parking_lot::Mutex<Option<JoinHandle<()>>>,
    stopping: watch::Sender<bool>,
    closed: AtomicBool,
}

/// The single authority of a session.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct Authority {
    inner: Arc<AuthorityInner>,
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("endpoint", &self.inner.endpoint)
            .field("session", &self.inner.session)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Authority {
    /// Binds `endpoint` and starts accepting participants.
    ///
    /// For TCP, port `0` picks a free port; [`endpoint`](Self::endpoint)
    /// reports the bound address.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::EndpointInUse`] if another authority serves
    /// the endpoint, or [`ConnectorError::Io`] if the socket cannot bind.
    pub async fn bind(
        hub: &LocalHub,
        endpoint: &Endpoint,
        credentials: CredentialStore,
        config: &ConnectorConfig,
    ) -> Result<Self, ConnectorError> {
        let (acceptor, bound, listener) = match endpoint {
            Endpoint::Local(name) => (hub.bind(name, LOCAL_BACKLOG)?, endpoint.clone(), None),
            Endpoint::Tcp(addr) => {
                let (acceptor, local, task) = transport::listen_tcp(addr, config.link_buffer).await?;
                (acceptor, Endpoint::Tcp(local.to_string()), Some(task))
            }
        };

        let (stopping, _) = watch::channel(false);
        let inner = Arc::new(AuthorityInner {
            endpoint: bound,
            session: SessionId::new(),
            hub: hub.clone(),
            credentials,
            config: config.clone(),
            state: Mutex::new(SessionState::default()),
            connections: parking_lot::Mutex::new(JoinSet::new()),
            listener: parking_lot::Mutex::new(listener),
            stopping,
            closed: AtomicBool::new(false),
        });

        let accept = accept_loop(Arc::clone(&inner), acceptor);
        inner.connections.lock().spawn(accept);

        info!(endpoint = %inner.endpoint, session = %inner.session, "authority bound");
        Ok(Self { inner })
    }

    /// Endpoint actually bound.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Session served.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.inner.session
    }

    /// Current canonical time.
    pub async fn time(&self) -> f64 {
        self.inner.state.lock().await.granted
    }

    /// Number of connected participants.
    pub async fn participant_count(&self) -> usize {
        self.inner.state.lock().await.members.len()
    }

    /// Current holder of a named lock.
    pub async fn lock_holder(&self, name: &str) -> Option<ParticipantId> {
        self.inner.state.lock().await.locks.holder(name)
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) ran.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Disconnects every participant and stops accepting.
    ///
    /// Waits for each `DisconnectAck` up to the configured shutdown timeout,
    /// then abandons the stragglers. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Endpoint::Local(name) = &self.inner.endpoint {
            self.inner.hub.unbind(name);
        }
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
        self.inner.stopping.send_replace(true);

        {
            let state = self.inner.state.lock().await;
            let payload = Payload::Disconnect {
                reason: Some("authority shutting down".to_string()),
            };
            for (id, member) in &state.members {
                let envelope = authority_envelope(&self.inner, state.granted, payload.clone());
                if member.tx.send(envelope).await.is_err() {
                    trace!(participant = %id, "member already gone");
                }
            }
        }

        let mut connections = std::mem::take(&mut *self.inner.connections.lock());
        let drained = tokio::time::timeout(self.inner.config.shutdown_timeout(), async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                endpoint = %self.inner.endpoint,
                remaining = connections.len(),
                "participants did not acknowledge disconnect in time"
            );
            connections.abort_all();
        }

        info!(endpoint = %self.inner.endpoint, session = %self.inner.session, "authority stopped");
    }
}

fn authority_envelope(inner: &AuthorityInner, time: f64, payload: Payload) -> Envelope {
    Envelope::new(inner.session, ParticipantId::authority(), time, payload)
}

async fn accept_loop(inner: Arc<AuthorityInner>, mut acceptor: Acceptor) {
    let mut stopping = inner.stopping.subscribe();
    loop {
        tokio::select! {
            link = acceptor.recv() => {
                let Some(link) = link else { break };
                let conn = Arc::clone(&inner);
                inner.connections.lock().spawn(serve_link(conn, link));
            }
            _ = stopping.changed() => break,
        }
    }
    debug!(endpoint = %inner.endpoint, "accept loop finished");
}

async fn serve_link(inner: Arc<AuthorityInner>, link: Link) {
    let (tx, mut rx) = link.split();

    let hello = match tokio::time::timeout(inner.config.handshake_timeout(), rx.recv()).await {
        Ok(Some(envelope)) => envelope,
        Ok(None) => return,
        Err(_) => {
            debug!(endpoint = %inner.endpoint, "handshake timed out");
            return;
        }
    };

    let (role, credentials, clocked) = match hello.payload {
        Payload::Hello {
            role,
            credentials,
            clocked,
        } => (role, credentials, clocked),
        other => {
            reject(&inner, &tx, format!("expected hello, got {}", other.kind())).await;
            return;
        }
    };
    if role == Role::Authority {
        reject(&inner, &tx, "the authority role is reserved".to_string()).await;
        return;
    }
    if let Err(reason) = inner.credentials.verify(&credentials) {
        warn!(identity = %credentials.identity, %role, reason = %reason, "participant rejected");
        reject(&inner, &tx, reason).await;
        return;
    }

    let id = ParticipantId::new();
    {
        let mut state = inner.state.lock().await;
        if inner.closed.load(Ordering::Acquire) {
            drop(state);
            reject(&inner, &tx, "authority shutting down".to_string()).await;
            return;
        }
        let welcome = authority_envelope(
            &inner,
            state.granted,
            Payload::Welcome {
                participant: id,
                session: inner.session,
                time: state.granted,
            },
        );
        if tx.send(welcome).await.is_err() {
            return;
        }
        state.members.insert(
            id,
            Member {
                role,
                identity: credentials.identity.clone(),
                clocked,
                tx,
                pending: None,
            },
        );
    }
    info!(participant = %id, %role, identity = %credentials.identity, clocked, "participant joined");

    let mut graceful = false;
    while let Some(envelope) = rx.recv().await {
        if !handle(&inner, id, envelope).await {
            graceful = true;
            break;
        }
    }
    leave(&inner, id, graceful).await;
}

async fn reject(inner: &AuthorityInner, tx: &mpsc::Sender<Envelope>, reason: String) {
    let _ = tx
        .send(authority_envelope(inner, 0.0, Payload::Rejected { reason }))
        .await;
}

/// Applies one envelope. Returns `false` when the member leaves.
async fn handle(inner: &AuthorityInner, from: ParticipantId, envelope: Envelope) -> bool {
    let mut state = inner.state.lock().await;
    trace!(participant = %from, kind = envelope.payload.kind(), "authority received");

    match envelope.payload {
        Payload::TimeRequest { until } => {
            let granted = state.granted;
            match until {
                Some(until) if until <= granted => {
                    send_to(inner, &state, from, Payload::TimeGrant { until: granted }).await;
                    if let Some(member) = state.members.get_mut(&from) {
                        member.pending = None;
                    }
                }
                _ => {
                    if let Some(member) = state.members.get_mut(&from) {
                        member.pending = Some(until);
                    }
                    advance(inner, &mut state).await;
                }
            }
        }
        Payload::Percept(percept) => {
            let targets: Vec<ParticipantId> = state
                .members
                .iter()
                .filter(|(_, m)| m.role == Role::Agent)
                .filter(|(_, m)| percept.target.as_ref().map_or(true, |t| *t == m.identity))
                .map(|(id, _)| *id)
                .collect();
            if targets.is_empty() {
                debug!(buffer = %percept.buffer, target = ?percept.target, "percept has no recipient");
            }
            for id in targets {
                relay(inner, &state, id, envelope.timestamp, Payload::Percept(percept.clone())).await;
            }
        }
        Payload::MotorCommand(command) => {
            let targets: Vec<ParticipantId> = state
                .members
                .iter()
                .filter(|(_, m)| m.role == Role::Effector)
                .filter(|(_, m)| command.target.as_ref().map_or(true, |t| *t == m.identity))
                .map(|(id, _)| *id)
                .collect();
            if targets.is_empty() {
                debug!(source = %command.source, target = ?command.target, "motor command has no recipient");
            }
            for id in targets {
                relay(inner, &state, id, envelope.timestamp, Payload::MotorCommand(command.clone())).await;
            }
        }
        Payload::LockRequest { name } => {
            if state.locks.acquire(&name, from) == LockOutcome::Granted {
                send_to(inner, &state, from, Payload::LockGrant { name }).await;
            }
        }
        Payload::LockRelease { name } => match state.locks.release(&name, from) {
            Ok(Some(next)) => send_to(inner, &state, next, Payload::LockGrant { name }).await,
            Ok(None) => {}
            Err(e) => warn!(participant = %from, error = %e, "ignoring lock release"),
        },
        Payload::Disconnect { reason } => {
            debug!(participant = %from, reason = ?reason, "participant disconnecting");
            send_to(inner, &state, from, Payload::DisconnectAck).await;
            return false;
        }
        Payload::DisconnectAck => return false,
        other => {
            warn!(participant = %from, kind = other.kind(), "unexpected payload from participant");
        }
    }
    true
}

/// Grants time if every clocked member agrees.
async fn advance(inner: &AuthorityInner, state: &mut SessionState) {
    let Some(grant) = state.next_grant() else {
        return;
    };
    state.granted = grant;
    for member in state.members.values_mut().filter(|m| m.clocked) {
        if matches!(member.pending, Some(Some(until)) if until <= grant) {
            member.pending = None;
        }
    }
    debug!(session = %inner.session, time = grant, "time granted");
    for member in state.members.values() {
        let envelope = authority_envelope(inner, grant, Payload::TimeGrant { until: grant });
        let _ = member.tx.send(envelope).await;
    }
}

async fn send_to(inner: &AuthorityInner, state: &SessionState, to: ParticipantId, payload: Payload) {
    relay(inner, state, to, state.granted, payload).await;
}

async fn relay(inner: &AuthorityInner, state: &SessionState, to: ParticipantId, timestamp: f64, payload: Payload) {
    if let Some(member) = state.members.get(&to) {
        if member.tx.send(authority_envelope(inner, timestamp, payload)).await.is_err() {
            trace!(participant = %to, "member link closed");
        }
    }
}

async fn leave(inner: &AuthorityInner, id: ParticipantId, graceful: bool) {
    let mut state = inner.state.lock().await;
    let Some(member) = state.members.remove(&id) else {
        return;
    };

    for (name, next) in state.locks.release_all(id) {
        if let Some(next) = next {
            send_to(inner, &state, next, Payload::LockGrant { name }).await;
        }
    }
    if member.clocked {
        advance(inner, &mut state).await;
    }

    if graceful {
        info!(participant = %id, identity = %member.identity, "participant left");
    } else {
        warn!(participant = %id, identity = %member.identity, "participant link dropped");
    }
}
