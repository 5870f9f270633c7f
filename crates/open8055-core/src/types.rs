use crate::{Result, constants::MAX_CARDS, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card slot number (`0..MAX_CARDS`).
///
/// Card `n` is the board whose USB product id is `OPEN8055_PID + n`. Only
/// validated ids can be constructed, so every `CardId` names a slot the
/// device layer is able to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CardId(u8);

impl CardId {
    /// Create a card id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardId` if `id >= MAX_CARDS`.
    pub fn new(id: u8) -> Result<Self> {
        if id >= MAX_CARDS {
            return Err(Error::InvalidCardId(id.to_string()));
        }
        Ok(CardId(id))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn index(&self) -> usize {
        usize::from(self.0)
    }

    /// Every card slot in ascending order.
    pub fn all() -> impl Iterator<Item = CardId> {
        (0..MAX_CARDS).map(CardId)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidCardId(s.to_string()))?;
        CardId::new(id).map_err(|_| Error::InvalidCardId(s.to_string()))
    }
}

impl TryFrom<u8> for CardId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        CardId::new(value)
    }
}

impl From<CardId> for u8 {
    fn from(id: CardId) -> u8 {
        id.0
    }
}

/// Lifecycle of a long-running task (acceptor, client session, card reader).
///
/// States only move forward: `Running -> Stopping -> Stopped`. A task is
/// asked to stop by moving it to `Stopping`; the task itself reports
/// `Stopped` once its resources are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RunState {
    #[default]
    Running,
    Stopping,
    Stopped,
}

impl RunState {
    /// Returns `true` if moving from `self` to `next` is allowed.
    ///
    /// Re-entering the current state is allowed so that repeated stop
    /// requests are harmless.
    #[must_use]
    pub fn can_transition_to(self, next: RunState) -> bool {
        next >= self
    }

    /// Validated transition.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` when `next` would move backwards.
    pub fn transition(self, next: RunState) -> Result<RunState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "RUNNING"),
            RunState::Stopping => write!(f, "STOPPING"),
            RunState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Verdict of an access rule.
///
/// `Plain` and `Md5` name the minimum password strength the client has to
/// prove. The ordering is the strength ordering: `Md5` is stronger than
/// `Plain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Deny,
    Trust,
    Plain,
    Md5,
}

impl AuthMethod {
    /// Returns `true` if a connection may be accepted under this verdict.
    #[must_use]
    pub fn permits_connect(self) -> bool {
        !matches!(self, AuthMethod::Deny)
    }

    /// Returns `true` if a password proven with `strength` is good enough
    /// for a rule requiring `self`.
    ///
    /// `strength` is expected to be `Plain` or `Md5`.
    #[must_use]
    pub fn accepts_strength(self, strength: AuthMethod) -> bool {
        match self {
            AuthMethod::Deny => false,
            AuthMethod::Trust => true,
            AuthMethod::Plain => matches!(strength, AuthMethod::Plain | AuthMethod::Md5),
            AuthMethod::Md5 => matches!(strength, AuthMethod::Md5),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Deny => "deny",
            AuthMethod::Trust => "trust",
            AuthMethod::Plain => "plain",
            AuthMethod::Md5 => "md5",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deny" => Ok(AuthMethod::Deny),
            "trust" => Ok(AuthMethod::Trust),
            "plain" => Ok(AuthMethod::Plain),
            "md5" => Ok(AuthMethod::Md5),
            _ => Err(Error::InvalidAuthMethod(s.to_string())),
        }
    }
}
