//! Client for the Open8055 control protocol.
//!
//! [`RemoteClient`] connects to a server, reads the greeting and the salt,
//! and wraps the commands of the protocol. Passwords are never sent in
//! clear text: they go out as `md5` + hex(md5(salt + hex(md5(password)))),
//! which satisfies both `plain` and `md5` access rules.
//!
//! All I/O is bounded by the configured timeout.
//!
//! # Example
//!
//! ```no_run
//! use open8055_protocol::{HidCommand, HidReport};
//! use open8055_server::{RemoteClient, RemoteClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = RemoteClient::connect(RemoteClientConfig::default()).await?;
//! let cards = client.list("nobody", "nopass").await?;
//!
//! if let Some(&card) = cards.first() {
//!     client.open(card, "nobody", "nopass").await?;
//!     client.send(&HidCommand::GetInput).await?;
//!     while let HidReport::Input(input) = client.recv_report().await? {
//!         println!("inputs: {:05b}", input.input_bits);
//!     }
//! }
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt::Display;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use open8055_access::users::salted_password;
use open8055_core::CardId;
use open8055_core::constants::DEFAULT_SERVER_PORT;
use open8055_protocol::{ControlCodec, HidCommand, HidReport, ProtocolError, Reply};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct RemoteClientConfig {
    pub server_addr: SocketAddr,
    /// Limit for connecting and for every send or receive.
    pub timeout: Duration,
}

impl Default for RemoteClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_SERVER_PORT)),
            timeout: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    #[error("read timeout after {0}ms")]
    ReadTimeout(u64),

    #[error("write timeout after {0}ms")]
    WriteTimeout(u64),

    #[error("connection closed by server")]
    ConnectionClosed,

    /// The server answered with an `ERROR` line.
    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected reply '{0}'")]
    Unexpected(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// One connection to an Open8055 server.
pub struct RemoteClient {
    framed: Framed<TcpStream, ControlCodec>,
    timeout: Duration,
    server_name: String,
    server_version: String,
    salt: String,
    /// Replies read ahead while waiting for something else.
    pending: VecDeque<Reply>,
}

impl RemoteClient {
    /// Connect and read the `HELLO` and `SALT` lines.
    ///
    /// # Errors
    /// Fails on timeout, I/O errors, or if the server does not greet as
    /// expected. A server that rejects the address answers `ERROR`, which
    /// is returned as `ClientError::Server`.
    pub async fn connect(config: RemoteClientConfig) -> ClientResult<Self> {
        let ms = millis(config.timeout);
        let stream = tokio::time::timeout(config.timeout, TcpStream::connect(config.server_addr))
            .await
            .map_err(|_| ClientError::ConnectionTimeout(ms))??;
        stream.set_nodelay(true)?;

        let mut client = Self {
            framed: Framed::new(stream, ControlCodec::client()),
            timeout: config.timeout,
            server_name: String::new(),
            server_version: String::new(),
            salt: String::new(),
            pending: VecDeque::new(),
        };

        match client.next_reply().await? {
            Reply::Hello { name, version } => {
                client.server_name = name;
                client.server_version = version;
            }
            other => return Err(unexpected(other)),
        }
        match client.next_reply().await? {
            Reply::Salt(salt) => client.salt = salt,
            other => return Err(unexpected(other)),
        }

        debug!(
            addr = %config.server_addr,
            server = %client.server_name,
            version = %client.server_version,
            "connected"
        );
        Ok(client)
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Cards present on the server.
    ///
    /// # Errors
    /// `ClientError::Server` if the server refuses.
    pub async fn list(&mut self, user: &str, password: &str) -> ClientResult<Vec<CardId>> {
        let hashed = salted_password(&self.salt, password);
        self.send_line(format!("LIST {user} {hashed}")).await?;
        loop {
            match self.next_reply().await? {
                Reply::List(cards) => return Ok(cards),
                Reply::Error(message) => return Err(ClientError::Server(message)),
                report @ Reply::Recv(_) => self.pending.push_back(report),
                other => return Err(unexpected(other)),
            }
        }
    }

    /// Open `card` and wait until it answers.
    ///
    /// A successful `OPEN` has no reply line of its own. The first report
    /// of the card confirms it, and stays queued for [`Self::recv`].
    ///
    /// # Errors
    /// `ClientError::Server` if the server refuses.
    pub async fn open(&mut self, card: CardId, user: &str, password: &str) -> ClientResult<()> {
        let hashed = salted_password(&self.salt, password);
        self.send_line(format!("OPEN {card} {user} {hashed}")).await?;
        match self.next_reply().await? {
            Reply::Error(message) => Err(ClientError::Server(message)),
            report @ Reply::Recv(_) => {
                self.pending.push_back(report);
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    /// Send a command to the open card.
    ///
    /// # Errors
    /// Fails on timeout or I/O errors. Errors of the server arrive
    /// through [`Self::recv`].
    pub async fn send(&mut self, command: &HidCommand) -> ClientResult<()> {
        let values: Vec<String> = command.to_values().iter().map(u16::to_string).collect();
        self.send_line(format!("SEND {}", values.join(" "))).await
    }

    /// Send one raw line.
    ///
    /// # Errors
    /// Fails on timeout or I/O errors.
    pub async fn send_line(&mut self, line: impl Display) -> ClientResult<()> {
        trace!(%line, "send");
        tokio::time::timeout(self.timeout, self.framed.send(line))
            .await
            .map_err(|_| ClientError::WriteTimeout(millis(self.timeout)))??;
        Ok(())
    }

    /// Next line from the server, queued lines first.
    ///
    /// # Errors
    /// Fails on timeout, I/O errors, or if the connection closed.
    pub async fn recv(&mut self) -> ClientResult<Reply> {
        match self.pending.pop_front() {
            Some(reply) => Ok(reply),
            None => self.next_reply().await,
        }
    }

    /// Next report of the open card.
    ///
    /// # Errors
    /// `ClientError::Server` for an `ERROR` line, otherwise see
    /// [`Self::recv`].
    pub async fn recv_report(&mut self) -> ClientResult<HidReport> {
        match self.recv().await? {
            Reply::Recv(report) => Ok(report),
            Reply::Error(message) => Err(ClientError::Server(message)),
            other => Err(unexpected(other)),
        }
    }

    /// Send `QUIT` and wait for the server to close the connection.
    ///
    /// # Errors
    /// Fails on timeout or I/O errors.
    pub async fn quit(mut self) -> ClientResult<()> {
        self.send_line("QUIT").await?;
        loop {
            match self.next_reply().await {
                Ok(reply) => trace!(%reply, "discarded after QUIT"),
                Err(ClientError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    async fn next_reply(&mut self) -> ClientResult<Reply> {
        let line = tokio::time::timeout(self.timeout, self.framed.next())
            .await
            .map_err(|_| ClientError::ReadTimeout(millis(self.timeout)))?
            .ok_or(ClientError::ConnectionClosed)??;
        trace!(%line, "received");
        Ok(line.parse()?)
    }
}

fn unexpected(reply: Reply) -> ClientError {
    match reply {
        Reply::Error(message) => ClientError::Server(message),
        other => ClientError::Unexpected(other.to_string()),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
