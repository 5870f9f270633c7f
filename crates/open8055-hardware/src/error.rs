//! Error types for card device operations.
//!
//! Messages follow the wording of the Open8055 device drivers
//! (`card3 not open`, `short read - expected 32, got 8`) because they are
//! forwarded verbatim to network clients in `ERROR` lines.

use open8055_core::CardId;

/// Result type alias for card device operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during card device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// No card with this number is attached.
    #[error("card{card} not present")]
    NotPresent { card: CardId },

    /// The card is already held open by someone.
    #[error("card{card} already open")]
    AlreadyOpen { card: CardId },

    /// The card has not been opened (or was closed meanwhile).
    #[error("card{card} not open")]
    NotOpen { card: CardId },

    #[error("short read - expected {expected}, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("short write - expected {expected}, got {got}")]
    ShortWrite { expected: usize, got: usize },

    /// The USB transfer itself failed.
    #[error("communication error: {message}")]
    Communication { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    pub fn not_present(card: CardId) -> Self {
        Self::NotPresent { card }
    }

    pub fn already_open(card: CardId) -> Self {
        Self::AlreadyOpen { card }
    }

    pub fn not_open(card: CardId) -> Self {
        Self::NotOpen { card }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn card(n: u8) -> CardId {
        CardId::new(n).unwrap()
    }

    #[rstest]
    #[case(HardwareError::not_present(card(0)), "card0 not present")]
    #[case(HardwareError::already_open(card(3)), "card3 already open")]
    #[case(HardwareError::not_open(card(15)), "card15 not open")]
    #[case(
        HardwareError::ShortRead { expected: 32, got: 8 },
        "short read - expected 32, got 8"
    )]
    #[case(
        HardwareError::communication("pipe error"),
        "communication error: pipe error"
    )]
    #[case(HardwareError::other("gone"), "gone")]
    fn test_error_display(#[case] error: HardwareError, #[case] message: &str) {
        assert_eq!(error.to_string(), message);
    }
}
