//! Connection acceptor.
//!
//! The [`Server`] owns the listening socket and spawns one
//! [`Session`](crate::session::Session) task per admitted client. Clients
//! are checked against the connect rules before a session exists; a
//! rejected client gets `ERROR access denied` and is disconnected.
//!
//! ```text
//! client ──> Server::run ──connect check──> Session ──> ReaderHandle ──> card
//!               ^                              │
//!               └──────── finished id ─────────┘
//! ```
//!
//! Sessions report their id on a channel when they have stopped, which
//! wakes the acceptor to reap them.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use open8055_hardware::AnyCardDevice;
//! use open8055_hardware::mock::SimulatedBoard;
//! use open8055_server::{PolicyCell, Server, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::default();
//! let (board, _handle) = SimulatedBoard::new();
//! let policy = PolicyCell::new(config.access_policy()?);
//!
//! let mut server = Server::bind(&config, Arc::new(AnyCardDevice::Simulated(board)), policy).await?;
//! let handle = server.handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.shutdown();
//! });
//!
//! let result = server.run().await;
//! server.shutdown().await;
//! result?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::SinkExt;
use open8055_access::AccessPolicy;
use open8055_core::{CardId, RunState};
use open8055_hardware::AnyCardDevice;
use open8055_protocol::{ControlCodec, Reply};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::session::{Session, SessionShared};
use crate::state::{PolicyCell, StateCell};

type SessionId = u64;

#[derive(Debug)]
struct SessionEntry {
    peer: SocketAddr,
    connected_at: DateTime<Utc>,
    shared: SessionShared,
    task: JoinHandle<()>,
}

impl SessionEntry {
    fn info(&self, id: SessionId) -> SessionInfo {
        SessionInfo {
            id,
            peer: self.peer,
            user: self.shared.user(),
            card: self.shared.card(),
            state: self.shared.state.get(),
            connected_at: self.connected_at,
            uptime: Utc::now() - self.connected_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SessionTable(Arc<Mutex<HashMap<SessionId, SessionEntry>>>);

impl SessionTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Snapshot of one client session, for monitoring.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    /// User of the last successful `LIST` or `OPEN`.
    pub user: Option<String>,
    pub card: Option<CardId>,
    pub state: RunState,
    pub connected_at: DateTime<Utc>,
    pub uptime: chrono::Duration,
}

/// Controls a running [`Server`] from other tasks.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    cancel: CancellationToken,
    policy: PolicyCell,
    sessions: SessionTable,
    state: StateCell,
}

impl ServerHandle {
    /// Ask the server to stop. [`Server::run`] returns soon after.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Install a new access policy. Checks already in progress finish with
    /// the old one.
    pub fn reload(&self, policy: AccessPolicy) {
        self.policy.replace(policy);
        info!("access policy reloaded");
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Sessions not yet reaped, ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .lock()
            .iter()
            .map(|(&id, entry)| entry.info(id))
            .collect();
        sessions.sort_by_key(|info| info.id);
        sessions
    }
}

enum Step {
    Cancelled,
    Finished(SessionId),
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
}

/// TCP acceptor for control protocol clients.
pub struct Server {
    listener: TcpListener,
    device: Arc<AnyCardDevice>,
    policy: PolicyCell,
    state: StateCell,
    cancel: CancellationToken,
    sessions: SessionTable,
    finished_tx: mpsc::UnboundedSender<SessionId>,
    finished_rx: mpsc::UnboundedReceiver<SessionId>,
    next_id: SessionId,
}

impl Server {
    /// Listen on the configured addresses.
    ///
    /// Without an explicit `listen_address` the wildcard IPv6 address is
    /// tried first, then the IPv4 one.
    ///
    /// # Errors
    /// Returns `ServerError::Bind` for the last address tried if none
    /// could be bound.
    pub async fn bind(
        config: &ServerConfig,
        device: Arc<AnyCardDevice>,
        policy: PolicyCell,
    ) -> Result<Self> {
        let mut failure = None;
        for addr in config.listen_addrs() {
            match TcpListener::bind(addr).await {
                Ok(listener) => return Ok(Self::from_listener(listener, device, policy)),
                Err(e) => {
                    warn!(%addr, error = %e, "cannot listen, trying next address");
                    failure = Some(ServerError::Bind { addr, source: e });
                }
            }
        }
        Err(failure.unwrap_or_else(|| ServerError::Bind {
            addr: SocketAddr::from(([0, 0, 0, 0], config.general.server_port)),
            source: std::io::Error::other("no listen address configured"),
        }))
    }

    /// Listen on exactly `addr`.
    ///
    /// # Errors
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind_addr(
        addr: SocketAddr,
        device: Arc<AnyCardDevice>,
        policy: PolicyCell,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self::from_listener(listener, device, policy))
    }

    fn from_listener(listener: TcpListener, device: Arc<AnyCardDevice>, policy: PolicyCell) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            listener,
            device,
            policy,
            state: StateCell::new(),
            cancel: CancellationToken::new(),
            sessions: SessionTable::default(),
            finished_tx,
            finished_rx,
            next_id: 1,
        }
    }

    /// # Errors
    /// Fails if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(ServerError::Accept)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            cancel: self.cancel.clone(),
            policy: self.policy.clone(),
            sessions: self.sessions.clone(),
            state: self.state.clone(),
        }
    }

    /// Accept clients until shutdown is requested.
    ///
    /// # Errors
    /// Returns `ServerError::Accept` if the listening socket fails. The
    /// server is `STOPPED` afterwards and all sessions have ended.
    pub async fn run(&mut self) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "accepting connections");
        }

        while self.state.is_running() {
            let step = tokio::select! {
                () = self.cancel.cancelled() => Step::Cancelled,
                Some(id) = self.finished_rx.recv() => Step::Finished(id),
                accepted = self.listener.accept() => Step::Accepted(accepted),
            };

            match step {
                Step::Cancelled => break,
                Step::Finished(id) => self.reap(id).await,
                Step::Accepted(Ok((stream, peer))) => self.admit(stream, peer),
                Step::Accepted(Err(e)) => {
                    error!(error = %e, "accept failed, server stopping");
                    self.stop_sessions().await;
                    self.state.advance(RunState::Stopped);
                    return Err(ServerError::Accept(e));
                }
            }
        }
        Ok(())
    }

    /// Stop every session, wait for them and close the listening socket.
    pub async fn shutdown(mut self) {
        info!("server shutting down");
        self.state.advance(RunState::Stopping);
        self.stop_sessions().await;
        drop(self.listener);
        self.state.advance(RunState::Stopped);
        info!("server stopped");
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err(reason) = self.policy.current().check_connect(peer.ip()) {
            warn!(%peer, %reason, "connection rejected");
            tokio::spawn(reject(stream, peer));
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, error = %e, "failed to set TCP_NODELAY");
        }

        let id = self.next_id;
        self.next_id += 1;

        let session = Session::new(
            stream,
            peer,
            rand::random::<u64>(),
            Arc::clone(&self.device),
            self.policy.clone(),
            self.cancel.child_token(),
        );
        let shared = session.shared();
        let finished = self.finished_tx.clone();
        let task = tokio::spawn(async move {
            session.run().await;
            let _ = finished.send(id);
        });

        let mut sessions = self.sessions.lock();
        sessions.insert(
            id,
            SessionEntry {
                peer,
                connected_at: Utc::now(),
                shared,
                task,
            },
        );
        info!(%peer, session = id, active = sessions.len(), "client connected");
    }

    async fn reap(&mut self, id: SessionId) {
        let Some(entry) = self.sessions.lock().remove(&id) else {
            return;
        };
        if let Err(e) = entry.task.await {
            error!(session = id, error = %e, "session task failed");
        }
        info!(
            peer = %entry.peer,
            session = id,
            uptime_secs = (Utc::now() - entry.connected_at).num_seconds(),
            "client disconnected"
        );
    }

    async fn stop_sessions(&mut self) {
        self.cancel.cancel();
        let entries: Vec<(SessionId, SessionEntry)> = self.sessions.lock().drain().collect();
        for (id, entry) in entries {
            if let Err(e) = entry.task.await {
                error!(session = id, error = %e, "session task failed");
            }
            debug!(peer = %entry.peer, session = id, state = %entry.shared.state.get(), "session ended");
        }
    }
}

async fn reject(stream: TcpStream, peer: SocketAddr) {
    let mut framed = Framed::new(stream, ControlCodec::new());
    if let Err(e) = framed.send(Reply::error("access denied")).await {
        debug!(%peer, error = %e, "cannot notify rejected client");
    }
    let _ = framed.get_mut().shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use open8055_access::{AccessList, UserFile};
    use open8055_hardware::mock::SimulatedBoard;
    use tokio::io::{AsyncBufReadExt, BufReader};

    async fn server(connect: &str) -> Server {
        let (board, _handle) = SimulatedBoard::new();
        let connect: AccessList = connect.parse().unwrap();
        let policy = PolicyCell::new(AccessPolicy::new(UserFile::new("unused.users")).with_connect(connect));
        Server::bind_addr(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(AnyCardDevice::Simulated(board)),
            policy,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_rejected_client_gets_error() {
        let mut server = server("0.0.0.0/0 all deny").await;
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
            server.shutdown().await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ERROR access denied"));
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert!(handle.sessions().is_empty());

        handle.shutdown();
        task.await.unwrap();
        assert_eq!(handle.state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_sessions_are_tracked_and_reaped() {
        let mut server = server("127.0.0.1/32 all trust").await;
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
            server.shutdown().await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        assert!(lines.next_line().await.unwrap().unwrap().starts_with("HELLO "));
        assert!(lines.next_line().await.unwrap().unwrap().starts_with("SALT "));

        let sessions = handle.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].state, RunState::Running);
        assert_eq!(sessions[0].peer.ip(), addr.ip());

        write.write_all(b"QUIT\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap(), None);
        while !handle.sessions().is_empty() {
            tokio::task::yield_now().await;
        }

        handle.shutdown();
        task.await.unwrap();
    }
}
