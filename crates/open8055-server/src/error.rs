use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use open8055_access::{AccessError, UserStoreError};
use open8055_core::CardId;
use open8055_hardware::HardwareError;
use open8055_protocol::ProtocolError;
use thiserror::Error;

/// Errors loading the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("access list '{list}': {source}")]
    Access {
        list: String,
        #[source]
        source: AccessError,
    },

    #[error("access list for invalid card '{0}'")]
    InvalidCard(String),
}

/// Errors of the connection acceptor.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Users(#[from] UserStoreError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Failure while serving one client.
///
/// [`SessionError::is_fatal`] splits these into errors reported to the peer
/// as an `ERROR` line while the session goes on, and errors that end the
/// session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("permission denied")]
    PermissionDenied,

    #[error("already connected to card {0}")]
    AlreadyConnected(CardId),

    #[error("not connected to a card")]
    NotConnected,

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Writing a command to the open card failed.
    #[error("from write {0}")]
    Write(#[source] HardwareError),

    #[error("card reader stopped unexpectedly")]
    ReaderStopped,

    #[error("connection: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Returns `true` if the session has to end.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Protocol(e) => e.is_fatal(),
            SessionError::Write(_) | SessionError::ReaderStopped | SessionError::Io(_) => true,
            SessionError::PermissionDenied
            | SessionError::AlreadyConnected(_)
            | SessionError::NotConnected
            | SessionError::Hardware(_) => false,
        }
    }

    /// Whether the peer should still get an `ERROR` line for this failure.
    ///
    /// Broken connections and a vanished reader are not reported.
    #[must_use]
    pub fn notify_peer(&self) -> bool {
        !matches!(
            self,
            SessionError::Io(_)
                | SessionError::ReaderStopped
                | SessionError::Protocol(ProtocolError::Io(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
