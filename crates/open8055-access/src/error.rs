use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing an access list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    /// A rule line does not have exactly three fields.
    #[error("line {line}: expected 'network user verdict', got '{text}'")]
    MalformedRule { line: usize, text: String },

    /// The network field is not an address or `address/prefix`.
    #[error("line {line}: invalid network '{network}'")]
    InvalidNetwork { line: usize, network: String },

    /// The verdict field is not one of deny, trust, plain or md5.
    #[error("line {line}: invalid verdict '{verdict}'")]
    InvalidVerdict { line: usize, verdict: String },
}

/// Errors raised by the users file.
#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: expected 'name:admin:password'")]
    MalformedRecord { line: usize },

    #[error("invalid user name '{0}'")]
    InvalidName(String),

    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("user '{0}' does not exist")]
    UserNotFound(String),

    #[error("a password is required for a new user")]
    PasswordRequired,
}

impl UserStoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for access list operations.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Result alias for users file operations.
pub type UserResult<T> = std::result::Result<T, UserStoreError>;

/// Reason an access check failed.
///
/// Peers only ever see "permission denied"; the reason is for the log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Denied {
    #[error("denied by access list")]
    Rule,

    #[error("unknown user or wrong password")]
    BadCredentials,

    #[error("{required} authentication required, got {given}")]
    TooWeak {
        required: open8055_core::AuthMethod,
        given: open8055_core::AuthMethod,
    },

    #[error("users file unavailable: {0}")]
    UserStore(String),
}
