//! Links between participants and the authority.
//!
//! ```text
//!  Participant                                   Authority
//!  ┌────────┐   Link (pair of bounded mpsc)      ┌────────┐
//!  │  tx ───┼──────────────────────────────────► │  rx    │
//!  │  rx ◄──┼─────────────────────────────────── │  tx    │
//!  └────────┘                                    └────────┘
//!
//!  Endpoint::Local(name)  the pair is handed over by a LocalHub
//!  Endpoint::Tcp(addr)    each side bridges its half to a TcpStream,
//!                         one JSON envelope per line
//! ```
//!
//! Above this module both transports look the same.

use super::envelope::Envelope;
use super::error::ConnectorError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Where an authority listens.
///
/// Parsed from `local:<name>` or `tcp:<host:port>`; a bare `host:port`
/// is TCP and a bare word is local.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// In-process channel registered with a [`LocalHub`].
    Local(String),
    /// TCP socket address.
    Tcp(String),
}

impl Endpoint {
    /// Local endpoint.
    #[must_use]
    pub fn local(name: impl Into<String>) -> Self {
        Self::Local(name.into())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(name) => write!(f, "local:{name}"),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConnectorError::protocol("empty endpoint"));
        }
        if let Some(name) = s.strip_prefix("local:") {
            return Ok(Self::Local(name.to_string()));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            return Ok(Self::Tcp(addr.to_string()));
        }
        if s.contains(':') {
            Ok(Self::Tcp(s.to_string()))
        } else {
            Ok(Self::Local(s.to_string()))
        }
    }
}

/// One end of a bidirectional envelope channel.
#[derive(Debug)]
pub struct Link {
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
}

impl Link {
    /// Creates two connected ends, each direction holding `buffer` envelopes.
    #[must_use]
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(buffer.max(1));
        let (b_tx, a_rx) = mpsc::channel(buffer.max(1));
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }

    /// Splits into the sending and receiving halves.
    #[must_use]
    pub fn split(self) -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
        (self.tx, self.rx)
    }

    /// Sends an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disconnected`] if the peer is gone.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ConnectorError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| ConnectorError::Disconnected)
    }

    /// Receives the next envelope, or `None` once the peer is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Stream of server-side link ends for an authority.
pub(crate) type Acceptor = mpsc::Receiver<Link>;

/// Registry of in-process endpoints.
///
/// Owned by a [`Runtime`](crate::Runtime); two runtimes never see each
/// other's local endpoints.
#[derive(Clone, Default)]
pub struct LocalHub {
    endpoints: Arc<Mutex<HashMap<String, mpsc::Sender<Link>>>>,
}

impl fmt::Debug for LocalHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHub")
            .field("endpoints", &self.endpoints.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocalHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if an authority serves `name`.
    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.endpoints
            .lock()
            .get(name)
            .is_some_and(|tx| !tx.is_closed())
    }

    pub(crate) fn bind(&self, name: &str, backlog: usize) -> Result<Acceptor, ConnectorError> {
        let mut endpoints = self.endpoints.lock();
        if endpoints.get(name).is_some_and(|tx| !tx.is_closed()) {
            return Err(ConnectorError::EndpointInUse {
                endpoint: Endpoint::Local(name.to_string()).to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(backlog.max(1));
        endpoints.insert(name.to_string(), tx);
        Ok(rx)
    }

    pub(crate) fn unbind(&self, name: &str) {
        self.endpoints.lock().remove(name);
    }

    async fn connect(&self, name: &str, buffer: usize) -> Result<Link, ConnectorError> {
        let not_found = || ConnectorError::EndpointNotFound {
            endpoint: Endpoint::Local(name.to_string()).to_string(),
        };
        let acceptor = self.endpoints.lock().get(name).cloned().ok_or_else(not_found)?;
        let (client, server) = Link::pair(buffer);
        acceptor.send(server).await.map_err(|_| not_found())?;
        Ok(client)
    }
}

/// Opens a client link to `endpoint`.
pub(crate) async fn connect(
    hub: &LocalHub,
    endpoint: &Endpoint,
    buffer: usize,
) -> Result<Link, ConnectorError> {
    match endpoint {
        Endpoint::Local(name) => hub.connect(name, buffer).await,
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    ConnectorError::EndpointNotFound {
                        endpoint: endpoint.to_string(),
                    }
                } else {
                    ConnectorError::Io(e)
                }
            })?;
            Ok(bridge_stream(stream, buffer))
        }
    }
}

/// Binds a TCP listener and feeds accepted connections into an acceptor.
pub(crate) async fn listen_tcp(
    addr: &str,
    buffer: usize,
) -> Result<(Acceptor, SocketAddr, JoinHandle<()>), ConnectorError> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            ConnectorError::EndpointInUse {
                endpoint: Endpoint::Tcp(addr.to_string()).to_string(),
            }
        } else {
            ConnectorError::Io(e)
        }
    })?;
    let local_addr = listener.local_addr()?;
    let (tx, rx) = mpsc::channel(16);

    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted tcp connection");
                    if tx.send(bridge_stream(stream, buffer)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "tcp accept failed");
                }
            }
        }
    });

    Ok((rx, local_addr, task))
}

/// Bridges a socket to a [`Link`] with newline-delimited JSON.
fn bridge_stream(stream: TcpStream, buffer: usize) -> Link {
    let (local, remote) = Link::pair(buffer);
    let (inbound, mut outbound) = remote.split();
    let (read_half, mut write_half) = stream.into_split();

    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<Envelope>(&line) {
                    Ok(envelope) => {
                        if inbound.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable envelope");
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "tcp read ended");
                    break;
                }
            }
        }
        trace!("tcp reader finished");
    });

    tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            let mut line = match serde_json::to_string(&envelope) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, kind = envelope.payload.kind(), "cannot encode envelope");
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = write_half.write_all(line.as_bytes()).await {
                debug!(error = %e, "tcp write ended");
                break;
            }
        }
        let _ = write_half.shutdown().await;
        trace!("tcp writer finished");
    });

    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Payload;
    use cogsim_types::{ParticipantId, SessionId};

    fn ping(name: &str) -> Envelope {
        Envelope::new(
            SessionId::unassigned(),
            ParticipantId::new(),
            0.0,
            Payload::LockRequest { name: name.into() },
        )
    }

    #[test]
    fn endpoint_parsing() {
        assert_eq!("local:999".parse::<Endpoint>().unwrap(), Endpoint::local("999"));
        assert_eq!("lab".parse::<Endpoint>().unwrap(), Endpoint::local("lab"));
        assert_eq!(
            "127.0.0.1:7000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:7000".into())
        );
        assert_eq!(
            "tcp:localhost:1".parse::<Endpoint>().unwrap().to_string(),
            "tcp:localhost:1"
        );
        assert!("  ".parse::<Endpoint>().is_err());
    }

    #[tokio::test]
    async fn link_pair_is_crossed() {
        let (mut a, mut b) = Link::pair(4);
        a.send(ping("x")).await.unwrap();
        b.send(ping("y")).await.unwrap();

        assert!(matches!(b.recv().await.unwrap().payload, Payload::LockRequest { name } if name == "x"));
        assert!(matches!(a.recv().await.unwrap().payload, Payload::LockRequest { name } if name == "y"));

        drop(a);
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn local_hub_binds_once() {
        let hub = LocalHub::new();
        let _acceptor = hub.bind("999", 4).unwrap();
        assert!(hub.is_bound("999"));
        assert!(matches!(
            hub.bind("999", 4),
            Err(ConnectorError::EndpointInUse { .. })
        ));
    }

    #[tokio::test]
    async fn local_hub_rebinds_after_acceptor_dropped() {
        let hub = LocalHub::new();
        drop(hub.bind("lab", 4).unwrap());
        assert!(!hub.is_bound("lab"));
        assert!(hub.bind("lab", 4).is_ok());
    }

    #[tokio::test]
    async fn connect_to_missing_local_endpoint() {
        let hub = LocalHub::new();
        let err = connect(&hub, &Endpoint::local("nobody"), 4).await.unwrap_err();
        assert!(matches!(err, ConnectorError::EndpointNotFound { .. }));
    }

    #[tokio::test]
    async fn local_connect_hands_over_server_end() {
        let hub = LocalHub::new();
        let mut acceptor = hub.bind("999", 4).unwrap();
        let client = connect(&hub, &Endpoint::local("999"), 4).await.unwrap();

        let mut server = acceptor.recv().await.unwrap();
        client.send(ping("hello")).await.unwrap();
        assert!(server.recv().await.is_some());
    }

    #[tokio::test]
    async fn tcp_bridge_carries_envelopes() {
        let (mut acceptor, addr, task) = listen_tcp("127.0.0.1:0", 8).await.unwrap();
        let hub = LocalHub::new();
        let mut client = connect(&hub, &Endpoint::Tcp(addr.to_string()), 8).await.unwrap();
        let mut server = acceptor.recv().await.unwrap();

        client.send(ping("over-tcp")).await.unwrap();
        let got = server.recv().await.unwrap();
        assert!(matches!(got.payload, Payload::LockRequest { name } if name == "over-tcp"));

        server.send(ping("back")).await.unwrap();
        let got = client.recv().await.unwrap();
        assert!(matches!(got.payload, Payload::LockRequest { name } if name == "back"));

        task.abort();
    }
}
