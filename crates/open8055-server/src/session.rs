//! Client session: one task per accepted connection.
//!
//! A session greets the client with `HELLO` and `SALT`, then handles
//! command lines in arrival order until the client quits, the connection
//! breaks, a fatal error occurs or the server shuts down. It owns at most
//! one open card and that card's reader.
//!
//! Errors of a single command are answered with an `ERROR` line and the
//! session continues. Socket failures, device write failures, an overlong
//! command line and a reader that stops on its own end the session.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use futures::{SinkExt, StreamExt};
use open8055_access::Grant;
use open8055_core::constants::SALT_HEX_LEN;
use open8055_core::{CardId, RunState};
use open8055_hardware::{AnyCardDevice, CardDevice, HardwareError};
use open8055_protocol::{ControlCodec, HidCommand, ProtocolError, Reply, Request};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::SessionError;
use crate::reader::{EVENT_QUEUE, ReaderEvent, ReaderHandle};
use crate::state::{PolicyCell, StateCell};

type SessionResult<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Default)]
struct Detail {
    user: Option<String>,
    card: Option<CardId>,
}

/// Session state visible to the acceptor.
#[derive(Debug, Clone, Default)]
pub struct SessionShared {
    pub state: StateCell,
    detail: Arc<Mutex<Detail>>,
}

impl SessionShared {
    fn detail(&self) -> std::sync::MutexGuard<'_, Detail> {
        self.detail.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// User name of the last successful `LIST` or `OPEN`.
    pub fn user(&self) -> Option<String> {
        self.detail().user.clone()
    }

    pub fn card(&self) -> Option<CardId> {
        self.detail().card
    }
}

struct OpenCard {
    id: CardId,
    reader: ReaderHandle,
    events: mpsc::Receiver<ReaderEvent>,
}

enum Step {
    Cancelled,
    Line(Option<Result<String, ProtocolError>>),
    Event(Option<ReaderEvent>),
}

/// Services one client connection.
pub struct Session<S> {
    peer: SocketAddr,
    salt: String,
    framed: Framed<S, ControlCodec>,
    device: Arc<AnyCardDevice>,
    policy: PolicyCell,
    shared: SessionShared,
    cancel: CancellationToken,
    card: Option<OpenCard>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        salt: u64,
        device: Arc<AnyCardDevice>,
        policy: PolicyCell,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            peer,
            salt: format!("{salt:0width$x}", width = SALT_HEX_LEN),
            framed: Framed::new(stream, ControlCodec::new()),
            device,
            policy,
            shared: SessionShared::default(),
            cancel,
            card: None,
        }
    }

    pub fn shared(&self) -> SessionShared {
        self.shared.clone()
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Serve the client until the session ends, then release the card and
    /// close the connection.
    pub async fn run(mut self) {
        debug!(peer = %self.peer, "session started");
        let result = match self.greet().await {
            Ok(()) => self.serve().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            match e {
                SessionError::ReaderStopped => warn!(peer = %self.peer, "card reader stopped unexpectedly"),
                e => info!(peer = %self.peer, error = %e, "session ended"),
            }
        }
        self.teardown().await;
    }

    async fn greet(&mut self) -> SessionResult<()> {
        self.reply(Reply::hello()).await?;
        self.reply(Reply::Salt(self.salt.clone())).await
    }

    async fn serve(&mut self) -> SessionResult<()> {
        while self.shared.state.is_running() {
            let step = tokio::select! {
                () = self.cancel.cancelled() => Step::Cancelled,
                line = self.framed.next() => Step::Line(line),
                event = next_event(&mut self.card) => Step::Event(event),
            };

            match step {
                Step::Cancelled => {
                    debug!(peer = %self.peer, "shutdown requested");
                    self.shared.state.advance(RunState::Stopping);
                }
                Step::Line(None) => {
                    debug!(peer = %self.peer, "client closed connection");
                    self.shared.state.advance(RunState::Stopping);
                }
                Step::Line(Some(Err(e))) => self.fail(e.into()).await?,
                Step::Line(Some(Ok(line))) => self.dispatch(&line).await?,
                Step::Event(Some(ReaderEvent::Report(report))) => {
                    self.reply(Reply::Recv(report)).await?;
                }
                Step::Event(Some(ReaderEvent::Failed(message))) => {
                    self.reply(Reply::Error(message)).await?;
                }
                Step::Event(None) => return Err(SessionError::ReaderStopped),
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, line: &str) -> SessionResult<()> {
        trace!(peer = %self.peer, line, "command");
        match self.execute(line).await {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e).await,
        }
    }

    /// Report `error` to the client. Fatal errors are passed on.
    async fn fail(&mut self, error: SessionError) -> SessionResult<()> {
        if error.is_fatal() {
            if error.notify_peer() {
                let _ = self.reply(Reply::error(&error)).await;
            }
            return Err(error);
        }
        warn!(peer = %self.peer, error = %error, "command failed");
        self.reply(Reply::error(&error)).await
    }

    async fn execute(&mut self, line: &str) -> SessionResult<()> {
        match Request::parse(line)? {
            Request::List { user, password } => self.list(&user, &password).await,
            Request::Open {
                card,
                user,
                password,
            } => self.open(&card, &user, &password).await,
            Request::Send { args } => self.send(&args).await,
            Request::Quit => {
                debug!(peer = %self.peer, "client quit");
                self.shared.state.advance(RunState::Stopping);
                Ok(())
            }
        }
    }

    async fn list(&mut self, user: &str, password: &str) -> SessionResult<()> {
        let policy = self.policy.current();
        let grant = policy
            .check_list(self.peer.ip(), user, password, &self.salt)
            .await
            .map_err(|reason| {
                warn!(peer = %self.peer, user, %reason, "LIST denied");
                SessionError::PermissionDenied
            })?;
        self.authenticated(user, &grant);

        let mut cards = Vec::new();
        for card in CardId::all() {
            if self.device.present(card).await {
                cards.push(card);
            }
        }
        self.reply(Reply::List(cards)).await
    }

    async fn open(&mut self, card: &str, user: &str, password: &str) -> SessionResult<()> {
        if let Some(open) = &self.card {
            return Err(SessionError::AlreadyConnected(open.id));
        }
        let card = Request::parse_card(card)?;

        let policy = self.policy.current();
        let grant = policy
            .check_open(card, self.peer.ip(), user, password, &self.salt)
            .await
            .map_err(|reason| {
                warn!(peer = %self.peer, user, %card, %reason, "OPEN denied");
                SessionError::PermissionDenied
            })?;

        self.device.open(card).await.map_err(|e| match e {
            HardwareError::AlreadyOpen { card } => SessionError::AlreadyConnected(card),
            other => other.into(),
        })?;
        self.authenticated(user, &grant);

        let (tx, events) = mpsc::channel(EVENT_QUEUE);
        let reader = ReaderHandle::spawn(Arc::clone(&self.device), card, tx);
        self.card = Some(OpenCard {
            id: card,
            reader,
            events,
        });
        self.shared.detail().card = Some(card);
        info!(peer = %self.peer, user, %card, "card opened");

        // The answer starts the reader's startup sequence.
        self.write_card(card, &HidCommand::GetConfig).await
    }

    async fn send(&mut self, args: &[String]) -> SessionResult<()> {
        let card = self
            .card
            .as_ref()
            .map(|open| open.id)
            .ok_or(SessionError::NotConnected)?;
        let command = HidCommand::from_args(args)?;
        if command == HidCommand::Reset {
            info!(peer = %self.peer, %card, "RESET");
        }
        self.write_card(card, &command).await
    }

    fn authenticated(&self, user: &str, grant: &Grant) {
        trace!(peer = %self.peer, user, verdict = %grant.verdict, "access granted");
        self.shared.detail().user = Some(user.to_string());
    }

    async fn write_card(&self, card: CardId, command: &HidCommand) -> SessionResult<()> {
        trace!(peer = %self.peer, %card, hid_type = %command.hid_type(), "write");
        self.device
            .write(card, &command.encode())
            .await
            .map(|_| ())
            .map_err(SessionError::Write)
    }

    async fn reply(&mut self, reply: Reply) -> SessionResult<()> {
        self.framed.send(reply).await.map_err(SessionError::from)
    }

    async fn teardown(&mut self) {
        self.shared.state.advance(RunState::Stopping);

        if let Some(OpenCard { id, reader, events }) = self.card.take() {
            // Nothing more goes to the client.
            drop(events);
            if reader.state().is_running() {
                reader.stop();
                if let Err(e) = self.device.write(id, &HidCommand::GetInput.encode()).await {
                    debug!(card = %id, error = %e, "reader wake-up failed");
                }
            }
            reader.join().await;

            match self.device.close(id).await {
                Ok(()) => info!(peer = %self.peer, card = %id, "card closed"),
                Err(e) => warn!(peer = %self.peer, card = %id, error = %e, "closing card failed"),
            }
            self.shared.detail().card = None;
        }

        if let Err(e) = self.framed.get_mut().shutdown().await {
            trace!(peer = %self.peer, error = %e, "socket shutdown failed");
        }
        self.shared.state.advance(RunState::Stopped);
        debug!(peer = %self.peer, "session stopped");
    }
}

async fn next_event(card: &mut Option<OpenCard>) -> Option<ReaderEvent> {
    match card {
        Some(open) => open.events.recv().await,
        None => std::future::pending().await,
    }
}
