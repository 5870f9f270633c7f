use thiserror::Error;

/// Errors raised while parsing control lines or packing HID records.
///
/// The `Display` text of every variant is exactly what follows `ERROR `
/// on the wire, so a session can forward it to its peer unchanged.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid card number '{0}'")]
    InvalidCardNumber(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid HID command type 0x{0:02X}")]
    UnknownCommandType(u32),

    #[error("unknown HID packet type 0x{0:02X} received from card")]
    UnknownReportType(u8),

    #[error("value {value} out of range for field {index} of HID type 0x{hid_type:02X} (max {max})")]
    ValueOutOfRange {
        hid_type: u8,
        index: usize,
        value: u32,
        max: u16,
    },

    #[error("too many values for HID type 0x{hid_type:02X}: expected at most {expected}, got {got}")]
    TooManyValues {
        hid_type: u8,
        expected: usize,
        got: usize,
    },

    #[error("short HID report - expected {expected}, got {got}")]
    ShortReport { expected: usize, got: usize },

    #[error("command line too long")]
    LineTooLong { max: usize },

    #[error("malformed reply '{0}'")]
    MalformedReply(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns `true` if the stream this error came from cannot be used
    /// any further.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::LineTooLong { .. } | ProtocolError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
