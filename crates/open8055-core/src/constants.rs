//! Core constants for the Open8055 network server.
//!
//! This module defines the protocol-level constants shared by the device
//! layer, the HID codec, and the TCP server. Values that also live in the
//! card firmware (report size, USB ids, card count) must not be changed
//! independently of it.
//!
//! # Session Greeting
//!
//! Every client connection starts with two lines sent by the server:
//!
//! ```text
//! HELLO Open8055Server 0.1.0
//! SALT 3f2a9c0d11e4b7a8
//! ```
//!
//! # Usage
//!
//! ```
//! use open8055_core::constants::*;
//!
//! assert_eq!(SERVER_NAME, "Open8055Server");
//! assert_eq!(HID_MESSAGE_SIZE, 32);
//!
//! // Card 3 enumerates with product id 0x55F3
//! assert_eq!(OPEN8055_PID + 3, 0x55F3);
//! ```

// ============================================================================
// Server Identification
// ============================================================================

/// Server name announced in the `HELLO` greeting.
pub const SERVER_NAME: &str = "Open8055Server";

/// Protocol version announced in the `HELLO` greeting.
pub const SERVER_VERSION: &str = crate::VERSION;

/// Default TCP port of the server.
pub const DEFAULT_SERVER_PORT: u16 = 8055;

// ============================================================================
// Cards
// ============================================================================

/// Number of card slots the server scans and accepts (`0..MAX_CARDS`).
pub const MAX_CARDS: u8 = 16;

/// USB vendor id of every Open8055 board.
pub const OPEN8055_VID: u16 = 0x10CF;

/// USB product id of card 0. Card `n` enumerates as `OPEN8055_PID + n`.
pub const OPEN8055_PID: u16 = 0x55F0;

/// Size of every HID report exchanged with a card, in bytes.
pub const HID_MESSAGE_SIZE: usize = 32;

// ============================================================================
// Control Protocol
// ============================================================================

/// Maximum length of one command line received from a client (bytes,
/// excluding the terminating newline).
pub const MAX_CMDLINE: usize = 256;

/// Number of hex characters in a session salt (64 random bits).
pub const SALT_HEX_LEN: usize = 16;

/// Prefix marking a password field as an md5 hash.
pub const MD5_PREFIX: &str = "md5";

/// Length of a prefixed md5 hash: `"md5"` plus 32 hex characters.
pub const MD5_HASH_LEN: usize = 35;

// ============================================================================
// Timeouts
// ============================================================================

/// Upper bound for waiting on a card reader after it has been told to stop
/// (milliseconds).
pub const READER_JOIN_TIMEOUT_MS: u64 = 5000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hash_len_matches_prefix() {
        assert_eq!(MD5_HASH_LEN, MD5_PREFIX.len() + 32);
    }

    #[test]
    fn test_server_version_is_package_version() {
        assert_eq!(SERVER_VERSION, "0.1.0");
    }
}
